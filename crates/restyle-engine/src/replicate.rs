use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use restyle_contracts::jobs::{resolve_output_url, GenerationMode, GenerationResult, JobStatus};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::{response_json_or_error, GatewayError, GenerationInput, GenerationProvider};

pub const DEFAULT_REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
pub const DEFAULT_REPLICATE_MODEL: &str = "adirik/interior-design";

const NEGATIVE_PROMPT: &str = "lowres, watermark, banner, logo, text, deformed, blurry, \
out of focus, surreal, ugly, distorted walls, extra windows, extra doors";

#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_base: String,
    pub api_token: Option<String>,
    pub model: String,
    pub version: Option<String>,
    pub poll_interval: Duration,
    // Never overrides `image` or `prompt`.
    pub extra_input: Map<String, Value>,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_REPLICATE_API_BASE.to_string(),
            api_token: None,
            model: DEFAULT_REPLICATE_MODEL.to_string(),
            version: None,
            poll_interval: Duration::from_secs(1),
            extra_input: Map::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplicateClient {
    config: ReplicateConfig,
    http: HttpClient,
}

impl ReplicateClient {
    pub fn new(mut config: ReplicateConfig, http: HttpClient) -> Self {
        config.api_base = config.api_base.trim().trim_end_matches('/').to_string();
        if config.api_base.is_empty() {
            config.api_base = DEFAULT_REPLICATE_API_BASE.to_string();
        }
        Self { config, http }
    }

    pub fn config(&self) -> &ReplicateConfig {
        &self.config
    }

    fn api_token(&self) -> Result<&str, GatewayError> {
        self.config
            .api_token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| GatewayError::Configuration("REPLICATE_API_TOKEN not set".to_string()))
    }

    fn create_endpoint(&self) -> String {
        match self.pinned_version() {
            Some(_) => format!("{}/predictions", self.config.api_base),
            None => format!(
                "{}/models/{}/predictions",
                self.config.api_base,
                self.config.model.trim().trim_matches('/')
            ),
        }
    }

    fn prediction_endpoint(&self, prediction_id: &str) -> String {
        format!("{}/predictions/{prediction_id}", self.config.api_base)
    }

    fn pinned_version(&self) -> Option<&str> {
        self.config
            .version
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn build_payload(&self, input: &GenerationInput) -> Value {
        let mut model_input = Map::new();
        model_input.insert("image".to_string(), Value::String(input.image.to_data_url()));
        model_input.insert("prompt".to_string(), Value::String(input.prompt.clone()));
        model_input.insert("negative_prompt".to_string(), json!(NEGATIVE_PROMPT));
        model_input.insert("num_inference_steps".to_string(), json!(50));
        model_input.insert("guidance_scale".to_string(), json!(15));
        model_input.insert("prompt_strength".to_string(), json!(0.8));
        for (key, value) in &self.config.extra_input {
            if matches!(key.trim(), "image" | "prompt") {
                continue;
            }
            model_input.insert(key.clone(), value.clone());
        }

        let mut payload = Map::new();
        if let Some(version) = self.pinned_version() {
            payload.insert("version".to_string(), Value::String(version.to_string()));
        }
        payload.insert("input".to_string(), Value::Object(model_input));
        Value::Object(payload)
    }

    pub async fn create_prediction(
        &self,
        input: &GenerationInput,
        wait: bool,
    ) -> Result<Value, GatewayError> {
        let api_token = self.api_token()?;
        let endpoint = self.create_endpoint();
        let mut request = self
            .http
            .post(&endpoint)
            .bearer_auth(api_token)
            .json(&self.build_payload(input));
        if wait {
            request = request.header("Prefer", "wait");
        }
        debug!(%endpoint, wait, "creating Replicate prediction");
        let response = request.send().await?;
        response_json_or_error("Replicate", response).await
    }

    pub async fn get_prediction(&self, prediction_id: &str) -> Result<Value, GatewayError> {
        self.get_json(&self.prediction_endpoint(prediction_id)).await
    }

    async fn get_json(&self, url: &str) -> Result<Value, GatewayError> {
        let api_token = self.api_token()?;
        let response = self.http.get(url).bearer_auth(api_token).send().await?;
        response_json_or_error("Replicate poll", response).await
    }

    // No deadline; polls until the prediction is terminal.
    pub async fn wait_for_prediction(&self, mut prediction: Value) -> Result<Value, GatewayError> {
        loop {
            let status = JobStatus::of_job(&prediction);
            match status {
                JobStatus::Succeeded => return Ok(prediction),
                JobStatus::Failed | JobStatus::Canceled => {
                    let details = prediction
                        .get("error")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|value| !value.is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Replicate prediction ended as {status:?}"));
                    return Err(GatewayError::upstream(details));
                }
                JobStatus::Unknown => {
                    return Err(GatewayError::upstream(format!(
                        "Replicate prediction returned an unrecognized status: {}",
                        prediction.get("status").cloned().unwrap_or(Value::Null)
                    )));
                }
                JobStatus::Queued | JobStatus::Running => {}
            }

            let poll_url = match prediction
                .get("urls")
                .and_then(|urls| urls.get("get"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
            {
                Some(url) => url.to_string(),
                None => {
                    let prediction_id = prediction
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|value| !value.is_empty())
                        .ok_or_else(|| {
                            GatewayError::upstream("Replicate prediction missing poll URL")
                        })?;
                    self.prediction_endpoint(prediction_id)
                }
            };
            tokio::time::sleep(self.poll_interval()).await;
            prediction = self.get_json(&poll_url).await?;
        }
    }

    fn poll_interval(&self) -> Duration {
        self.config
            .poll_interval
            .clamp(Duration::from_millis(200), Duration::from_secs(10))
    }
}

fn prediction_field<'a>(prediction: &'a Value, key: &str) -> &'a str {
    prediction.get(key).and_then(Value::as_str).unwrap_or_default()
}

pub struct ReplicatePollProvider {
    client: ReplicateClient,
}

impl ReplicatePollProvider {
    pub fn new(client: ReplicateClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GenerationProvider for ReplicatePollProvider {
    fn name(&self) -> &str {
        "replicate"
    }

    fn mode(&self) -> GenerationMode {
        GenerationMode::Poll
    }

    async fn start(&self, input: &GenerationInput) -> Result<GenerationResult, GatewayError> {
        let prediction = self.client.create_prediction(input, false).await?;
        let prediction_id = prediction_field(&prediction, "id");
        let status = prediction_field(&prediction, "status");
        info!(prediction_id, status, "Replicate prediction created");
        Ok(GenerationResult::Job(prediction))
    }

    async fn status(&self, job_id: &str) -> Result<Value, GatewayError> {
        self.client.get_prediction(job_id).await
    }
}

pub struct ReplicateWaitProvider {
    client: ReplicateClient,
}

impl ReplicateWaitProvider {
    pub fn new(client: ReplicateClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GenerationProvider for ReplicateWaitProvider {
    fn name(&self) -> &str {
        "replicate"
    }

    fn mode(&self) -> GenerationMode {
        GenerationMode::Wait
    }

    async fn start(&self, input: &GenerationInput) -> Result<GenerationResult, GatewayError> {
        let prediction = self.client.create_prediction(input, true).await?;
        let prediction = self.client.wait_for_prediction(prediction).await?;
        let output = prediction
            .get("output")
            .filter(|value| !value.is_null())
            .ok_or_else(|| GatewayError::upstream("Replicate prediction succeeded without output"))?;
        let url = resolve_output_url(output);
        let prediction_id = prediction_field(&prediction, "id");
        info!(prediction_id, "Replicate prediction completed");
        Ok(GenerationResult::Completed { url })
    }

    async fn status(&self, job_id: &str) -> Result<Value, GatewayError> {
        self.client.get_prediction(job_id).await
    }
}
