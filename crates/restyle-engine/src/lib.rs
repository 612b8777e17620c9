use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Response as HttpResponse;
use restyle_contracts::jobs::{GenerationMode, GenerationResult};
use restyle_contracts::requests::ImagePayload;
use serde_json::Value;
use tracing::warn;

mod dryrun;
mod error;
mod replicate;
mod service;
pub mod vision;

pub use dryrun::DryrunProvider;
pub use error::GatewayError;
pub use replicate::{
    ReplicateClient, ReplicateConfig, ReplicatePollProvider, ReplicateWaitProvider,
    DEFAULT_REPLICATE_API_BASE, DEFAULT_REPLICATE_MODEL,
};
pub use service::{validate_job_id, RedesignPlan, RedesignService};

use error::provider_error_details;

#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub image: ImagePayload,
    pub prompt: String,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;
    fn mode(&self) -> GenerationMode;
    async fn start(&self, input: &GenerationInput) -> Result<GenerationResult, GatewayError>;
    async fn status(&self, job_id: &str) -> Result<Value, GatewayError>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Arc<dyn GenerationProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: GenerationProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerationProvider>> {
        self.providers.get(name.trim()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry(
    replicate: ReplicateConfig,
    mode: GenerationMode,
    http: reqwest::Client,
) -> ImageProviderRegistry {
    let mut providers = ImageProviderRegistry::new();
    providers.register(DryrunProvider::new(mode));
    let client = ReplicateClient::new(replicate, http);
    match mode {
        GenerationMode::Poll => providers.register(ReplicatePollProvider::new(client)),
        GenerationMode::Wait => providers.register(ReplicateWaitProvider::new(client)),
    }
    providers
}

pub(crate) async fn response_json_or_error(
    provider: &str,
    response: HttpResponse,
) -> Result<Value, GatewayError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().await?;
    if !status.is_success() {
        let err = GatewayError::from_provider_status(code, provider_error_details(&body));
        warn!(
            provider,
            provider_status = code,
            mapped_status = err.status_code(),
            "provider request failed"
        );
        return Err(err);
    }
    serde_json::from_str(&body).map_err(|err| GatewayError::Upstream {
        status: Some(code),
        details: Some(format!("{provider} returned invalid JSON payload: {err}")),
    })
}

pub(crate) fn now_utc_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_wires_requested_mode() {
        let registry = default_provider_registry(
            ReplicateConfig::default(),
            GenerationMode::Wait,
            reqwest::Client::new(),
        );
        assert_eq!(registry.names(), vec!["dryrun".to_string(), "replicate".to_string()]);
        let replicate = registry.get("replicate").unwrap();
        assert_eq!(replicate.mode(), GenerationMode::Wait);
        assert_eq!(registry.get(" dryrun ").unwrap().mode(), GenerationMode::Wait);
        assert!(registry.get("stability").is_none());
    }
}
