use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::Client as HttpClient;
use restyle_contracts::styles::LabelSelector;
use restyle_engine::vision::{HuggingFaceCaptioner, OpenAiVisionAnalyzer, SceneAnalyzer};
use restyle_engine::{default_provider_registry, RedesignService};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info_span, warn};
use uuid::Uuid;

use crate::config::{ServerConfig, VisionBackend};
use crate::error::ApiError;
use crate::extract::RedesignForm;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RedesignService>,
}

impl AppState {
    pub fn new(service: RedesignService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    pub fn from_config(config: &ServerConfig, http: HttpClient) -> Result<Self> {
        let registry = default_provider_registry(config.replicate.clone(), config.mode, http.clone());
        let provider = registry.get(&config.provider).ok_or_else(|| {
            anyhow!(
                "unknown generation provider '{}' (available: {})",
                config.provider,
                registry.names().join(", ")
            )
        })?;
        if provider.name() == "replicate" && config.replicate.api_token.is_none() {
            warn!("REPLICATE_API_TOKEN not set; redesign requests will fail until it is configured");
        }

        let analyzer = build_analyzer(config, http);
        let selector = LabelSelector::new(None).with_defaults(
            config.default_style.as_deref(),
            config.default_room_type.as_deref(),
        );
        let service = RedesignService::new(provider, analyzer, selector)
            .with_vision_timeout(config.vision.timeout);
        Ok(Self::new(service))
    }
}

fn build_analyzer(config: &ServerConfig, http: HttpClient) -> Option<Arc<dyn SceneAnalyzer>> {
    let vision = &config.vision;
    match vision.backend {
        VisionBackend::Disabled => None,
        VisionBackend::HuggingFace => Some(Arc::new(HuggingFaceCaptioner::new(
            Some(vision.huggingface_api_base.clone()),
            Some(vision.huggingface_model.clone()),
            vision.huggingface_token.clone(),
            http,
        ))),
        VisionBackend::OpenAi => match vision.openai_api_key.clone() {
            Some(api_key) => Some(Arc::new(OpenAiVisionAnalyzer::new(
                Some(vision.openai_api_base.clone()),
                api_key,
                Some(vision.openai_model.clone()),
                http,
            ))),
            None => {
                warn!("VISION_PROVIDER=openai but OPENAI_API_KEY is not set; vision analysis disabled");
                None
            }
        },
    }
}

pub fn build_router(state: AppState, allowed_origin: &str, body_limit: usize) -> Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(allow_origin(allowed_origin)?)
        .allow_methods(Any)
        .allow_headers(Any);
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        info_span!(
            "http",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %Uuid::new_v4(),
        )
    });

    Ok(Router::new()
        .route("/api/start-redesign", post(start_redesign))
        .route("/api/get-redesign", get(get_redesign))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(trace)
        .with_state(state))
}

fn allow_origin(raw: &str) -> Result<AllowOrigin> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "*" {
        return Ok(AllowOrigin::any());
    }
    let origins = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin '{origin}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(AllowOrigin::list(origins))
}

async fn start_redesign(
    State(state): State<AppState>,
    RedesignForm(request): RedesignForm,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let result = state.service.start_redesign(request).await?;
    Ok((StatusCode::CREATED, Json(result.to_response_body())))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    id: Option<String>,
}

async fn get_redesign(
    State(state): State<AppState>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query.map_err(|rejection| {
        ApiError::bad_request("Malformed query string").with_details(rejection.body_text())
    })?;
    let job = state
        .service
        .redesign_status(query.id.as_deref())
        .await
        .map_err(ApiError::from_status_failure)?;
    Ok(Json(job))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "provider": state.service.provider_name(),
        "mode": state.service.mode(),
        "vision": state.service.analyzer_name().unwrap_or("none"),
    }))
}
