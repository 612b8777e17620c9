use std::sync::Arc;
use std::time::Duration;

use restyle_contracts::jobs::{GenerationMode, GenerationResult, JobStatus};
use restyle_contracts::prompts::{compose_prompt, PromptInputs};
use restyle_contracts::requests::{ImagePayload, RedesignRequest, SceneDescription};
use restyle_contracts::styles::{LabelKind, LabelSelection, LabelSelector};
use serde_json::Value;
use tracing::{debug, info};

use crate::vision::{analyze_scene, SceneAnalyzer};
use crate::{GatewayError, GenerationInput, GenerationProvider};

pub const DEFAULT_VISION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RedesignPlan {
    pub style: LabelSelection,
    pub room_type: LabelSelection,
    pub scene: SceneDescription,
    pub prompt: String,
}

pub struct RedesignService {
    provider: Arc<dyn GenerationProvider>,
    analyzer: Option<Arc<dyn SceneAnalyzer>>,
    selector: LabelSelector,
    vision_timeout: Duration,
}

impl RedesignService {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        analyzer: Option<Arc<dyn SceneAnalyzer>>,
        selector: LabelSelector,
    ) -> Self {
        Self {
            provider,
            analyzer,
            selector,
            vision_timeout: DEFAULT_VISION_TIMEOUT,
        }
    }

    pub fn with_vision_timeout(mut self, timeout: Duration) -> Self {
        self.vision_timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn mode(&self) -> GenerationMode {
        self.provider.mode()
    }

    pub fn analyzer_name(&self) -> Option<&str> {
        self.analyzer.as_deref().map(|analyzer| analyzer.name())
    }

    pub fn selector(&self) -> &LabelSelector {
        &self.selector
    }

    pub async fn plan(&self, request: &RedesignRequest, image: &ImagePayload) -> RedesignPlan {
        let style = self.selector.select(request.style.as_deref(), LabelKind::Style);
        let room_type = self
            .selector
            .select(request.room_type.as_deref(), LabelKind::RoomType);
        for selection in [&style, &room_type] {
            if let (Some(requested), Some(reason)) =
                (selection.requested.as_deref(), selection.fallback_reason.as_deref())
            {
                info!(
                    kind = selection.spec.kind.as_str(),
                    requested,
                    reason,
                    "corrected unrecognized tag"
                );
            }
        }

        let scene = analyze_scene(self.analyzer.as_deref(), image, self.vision_timeout).await;
        let prompt = compose_prompt(PromptInputs {
            user_prompt: request.prompt.as_deref().unwrap_or_default(),
            style: &style.spec,
            room_type: &room_type.spec,
            scene: &scene,
        });
        debug!(
            style = %style.spec.slug,
            room_type = %room_type.spec.slug,
            scene_observed = scene.is_observed(),
            prompt_chars = prompt.chars().count(),
            "redesign planned"
        );

        RedesignPlan {
            style,
            room_type,
            scene,
            prompt,
        }
    }

    pub async fn start_redesign(
        &self,
        request: RedesignRequest,
    ) -> Result<GenerationResult, GatewayError> {
        let image = match request.image.as_ref() {
            Some(image) if !image.is_empty() => image.clone(),
            _ => return Err(GatewayError::InvalidInput("Image is required".to_string())),
        };
        let plan = self.plan(&request, &image).await;
        let input = GenerationInput {
            image,
            prompt: plan.prompt,
        };
        let result = self.provider.start(&input).await?;
        match &result {
            GenerationResult::Job(job) => {
                let job_id = job.get("id").and_then(Value::as_str).unwrap_or_default();
                let status = JobStatus::of_job(job);
                info!(
                    provider = self.provider.name(),
                    job_id,
                    status = ?status,
                    "redesign job created"
                )
            }
            GenerationResult::Completed { .. } => info!(
                provider = self.provider.name(),
                "redesign completed"
            ),
        }
        Ok(result)
    }

    pub async fn redesign_status(&self, job_id: Option<&str>) -> Result<Value, GatewayError> {
        let job_id = validate_job_id(job_id)?;
        self.provider.status(job_id).await
    }
}

// Checked before the id is placed into a provider URL.
pub fn validate_job_id(raw: Option<&str>) -> Result<&str, GatewayError> {
    let job_id = raw.map(str::trim).unwrap_or_default();
    if job_id.is_empty() {
        return Err(GatewayError::InvalidInput("Prediction ID is required".to_string()));
    }
    if !job_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
    {
        return Err(GatewayError::InvalidInput("Prediction ID is invalid".to_string()));
    }
    Ok(job_id)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingProvider {
        prompts: Mutex<Vec<String>>,
        status_calls: AtomicUsize,
    }

    impl RecordingProvider {
        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn mode(&self) -> GenerationMode {
            GenerationMode::Poll
        }

        async fn start(&self, input: &GenerationInput) -> Result<GenerationResult, GatewayError> {
            self.prompts.lock().unwrap().push(input.prompt.clone());
            Ok(GenerationResult::Job(
                json!({"id": "job-1", "status": "starting"}),
            ))
        }

        async fn status(&self, job_id: &str) -> Result<Value, GatewayError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"id": job_id, "status": "processing"}))
        }
    }

    struct FixedAnalyzer(&'static str);

    #[async_trait]
    impl SceneAnalyzer for FixedAnalyzer {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn describe(&self, _image: &ImagePayload) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingAnalyzer;

    #[async_trait]
    impl SceneAnalyzer for FailingAnalyzer {
        fn name(&self) -> &str {
            "failing"
        }

        async fn describe(&self, _image: &ImagePayload) -> Result<String> {
            bail!("caption request failed (401): invalid token")
        }
    }

    fn service(
        provider: Arc<RecordingProvider>,
        analyzer: Option<Arc<dyn SceneAnalyzer>>,
    ) -> RedesignService {
        RedesignService::new(provider, analyzer, LabelSelector::new(None))
    }

    fn kitchen_request() -> RedesignRequest {
        RedesignRequest {
            image: Some(ImagePayload::from_data_url("data:image/png;base64,AAA").unwrap()),
            prompt: None,
            style: Some("scandinavian_minimalist".to_string()),
            room_type: Some("kitchen".to_string()),
        }
    }

    #[tokio::test]
    async fn observed_scene_flows_into_prompt() {
        let provider = Arc::new(RecordingProvider::default());
        let service = service(
            provider.clone(),
            Some(Arc::new(FixedAnalyzer("a wooden table and two chairs"))),
        );
        service.start_redesign(kitchen_request()).await.unwrap();

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Scandinavian Minimalist"));
        assert!(prompts[0].contains("Kitchen"));
        assert!(prompts[0].contains("wooden table and two chairs"));
    }

    #[tokio::test]
    async fn failed_vision_still_generates_without_contents_clause() {
        let provider = Arc::new(RecordingProvider::default());
        let service = service(provider.clone(), Some(Arc::new(FailingAnalyzer)));
        let result = service.start_redesign(kitchen_request()).await.unwrap();
        assert!(matches!(result, GenerationResult::Job(_)));

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Scandinavian Minimalist"));
        assert!(prompts[0].contains("Kitchen"));
        assert!(!prompts[0].contains("currently contains"));
    }

    #[tokio::test]
    async fn missing_image_is_rejected_before_provider() {
        let provider = Arc::new(RecordingProvider::default());
        let service = service(provider.clone(), None);
        let err = service
            .start_redesign(RedesignRequest {
                style: Some("industrial".to_string()),
                ..RedesignRequest::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_local());
        assert_eq!(err.status_code(), 400);
        assert!(provider.prompts().is_empty());
    }

    #[tokio::test]
    async fn unknown_tags_fall_back_to_defaults() {
        let provider = Arc::new(RecordingProvider::default());
        let service = service(provider.clone(), None);
        let mut request = kitchen_request();
        request.style = Some("vaporwave".to_string());
        request.room_type = Some("garage".to_string());

        let image = request.image.clone().unwrap();
        let plan = service.plan(&request, &image).await;
        assert_eq!(plan.style.spec.slug, "modern_luxury");
        assert_eq!(plan.room_type.spec.slug, "living_room");
        assert_eq!(plan.style.spec.kind, LabelKind::Style);
        assert_eq!(plan.room_type.spec.kind, LabelKind::RoomType);
        assert!(plan.style.fallback_reason.is_some());
        assert_eq!(plan.scene, SceneDescription::Unavailable);
        assert!(plan.prompt.contains("Living Room"));
    }

    #[tokio::test]
    async fn status_requires_valid_id() {
        let provider = Arc::new(RecordingProvider::default());
        let service = service(provider.clone(), None);

        for bad in [None, Some(""), Some("  "), Some("../account"), Some("abc?x=1")] {
            let err = service.redesign_status(bad).await.unwrap_err();
            assert_eq!(err.status_code(), 400, "{bad:?}");
        }
        assert_eq!(provider.status_calls.load(Ordering::SeqCst), 0);

        let job = service.redesign_status(Some("abc_123-x")).await.unwrap();
        assert_eq!(job["id"], json!("abc_123-x"));
        assert_eq!(provider.status_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn service_reports_collaborators() {
        let provider = Arc::new(RecordingProvider::default());
        let service = service(provider, Some(Arc::new(FixedAnalyzer("a sofa"))))
            .with_vision_timeout(Duration::from_secs(5));
        assert_eq!(service.provider_name(), "recording");
        assert_eq!(service.mode(), GenerationMode::Poll);
        assert_eq!(service.analyzer_name(), Some("fixed"));
        assert_eq!(service.vision_timeout, Duration::from_secs(5));
    }
}
