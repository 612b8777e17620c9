use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client as HttpClient;
use restyle_contracts::requests::{ImagePayload, SceneDescription};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::truncate_text;

pub const DEFAULT_HUGGINGFACE_API_BASE: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_HUGGINGFACE_CAPTION_MODEL: &str = "Salesforce/blip-image-captioning-large";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_VISION_MODEL: &str = "gpt-4o-mini";

const CAPTION_MAX_CHARS: usize = 300;
const CAPTION_KEYS: [&str; 5] = ["generated_text", "caption", "text", "description", "output"];
const CAPTION_NOISE_PREFIXES: [&str; 4] = ["arafed ", "araffe ", "there is ", "this is "];

#[async_trait]
pub trait SceneAnalyzer: Send + Sync {
    fn name(&self) -> &str;
    async fn describe(&self, image: &ImagePayload) -> Result<String>;
}

pub async fn analyze_scene(
    analyzer: Option<&dyn SceneAnalyzer>,
    image: &ImagePayload,
    timeout: Duration,
) -> SceneDescription {
    let Some(analyzer) = analyzer else {
        debug!("vision analysis disabled; using sentinel description");
        return SceneDescription::Unavailable;
    };
    match tokio::time::timeout(timeout, analyzer.describe(image)).await {
        Ok(Ok(caption)) => {
            let description = SceneDescription::from_caption(&caption);
            if !description.is_observed() {
                warn!(analyzer = analyzer.name(), "vision analysis returned no usable caption");
            }
            description
        }
        Ok(Err(err)) => {
            warn!(analyzer = analyzer.name(), error = %format!("{err:#}"), "vision analysis failed; using sentinel description");
            SceneDescription::Unavailable
        }
        Err(_) => {
            warn!(
                analyzer = analyzer.name(),
                timeout_s = timeout.as_secs_f64(),
                "vision analysis timed out; using sentinel description"
            );
            SceneDescription::Unavailable
        }
    }
}

pub struct HuggingFaceCaptioner {
    api_base: String,
    model: String,
    token: Option<String>,
    http: HttpClient,
}

impl HuggingFaceCaptioner {
    pub fn new(
        api_base: Option<String>,
        model: Option<String>,
        token: Option<String>,
        http: HttpClient,
    ) -> Self {
        Self {
            api_base: api_base
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_HUGGINGFACE_API_BASE.to_string()),
            model: model
                .map(|value| value.trim().trim_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_HUGGINGFACE_CAPTION_MODEL.to_string()),
            token: token.filter(|value| !value.trim().is_empty()),
            http,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}", self.api_base, self.model)
    }
}

#[async_trait]
impl SceneAnalyzer for HuggingFaceCaptioner {
    fn name(&self) -> &str {
        "huggingface"
    }

    async fn describe(&self, image: &ImagePayload) -> Result<String> {
        let endpoint = self.endpoint();
        let mut request = self
            .http
            .post(&endpoint)
            .header(CONTENT_TYPE, image.mime_type.as_str())
            .body(image.bytes.clone());
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token.trim());
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("caption request failed ({endpoint})"))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("caption response body read failed")?;
        if !status.is_success() {
            bail!(
                "caption request failed ({}): {}",
                status.as_u16(),
                truncate_text(&body, 256)
            );
        }
        let parsed: Value =
            serde_json::from_str(&body).context("caption provider returned invalid JSON")?;
        let caption = extract_caption_text(&parsed)
            .ok_or_else(|| anyhow!("caption response carried no text"))?;
        clean_caption(&caption)
    }
}

pub struct OpenAiVisionAnalyzer {
    api_base: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl OpenAiVisionAnalyzer {
    pub fn new(
        api_base: Option<String>,
        api_key: String,
        model: Option<String>,
        http: HttpClient,
    ) -> Self {
        Self {
            api_base: api_base
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string()),
            api_key,
            model: model
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_OPENAI_VISION_MODEL.to_string()),
            http,
        }
    }
}

#[async_trait]
impl SceneAnalyzer for OpenAiVisionAnalyzer {
    fn name(&self) -> &str {
        "openai"
    }

    async fn describe(&self, image: &ImagePayload) -> Result<String> {
        let endpoint = format!("{}/responses", self.api_base);
        let payload = json!({
            "model": self.model,
            "input": [{
                "role": "user",
                "content": [
                    {"type": "input_text", "text": describe_instruction()},
                    {"type": "input_image", "image_url": image.to_data_url()},
                ],
            }],
            "max_output_tokens": 160,
        });
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(self.api_key.trim())
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("vision request failed ({endpoint})"))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("vision response body read failed")?;
        if !status.is_success() {
            bail!(
                "vision request failed ({}): {}",
                status.as_u16(),
                truncate_text(&body, 256)
            );
        }
        let parsed: Value =
            serde_json::from_str(&body).context("vision provider returned invalid JSON")?;
        let text = extract_openai_output_text(&parsed);
        if text.is_empty() {
            bail!("vision response carried no text");
        }
        clean_caption(&text)
    }
}

fn describe_instruction() -> &'static str {
    "List the furniture and notable objects visible in this room photo as one short \
noun phrase (for example: a grey sofa, a wooden coffee table and a floor lamp). \
No full sentences, no opinions, no mention of the photo itself."
}

pub fn extract_caption_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Array(rows) => rows.iter().find_map(extract_caption_text),
        Value::Object(obj) => CAPTION_KEYS
            .iter()
            .find_map(|key| obj.get(*key).and_then(extract_caption_text)),
        _ => None,
    }
}

fn extract_openai_output_text(response: &Value) -> String {
    if let Some(text) = response.get("output_text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return text.trim().to_string();
        }
    }

    let mut parts: Vec<String> = Vec::new();
    let rows = response
        .get("output")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for row in rows {
        let content = row
            .get("content")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for chunk in content {
            let kind = chunk.get("type").and_then(Value::as_str).unwrap_or_default();
            if !matches!(kind, "output_text" | "text") {
                continue;
            }
            if let Some(text) = chunk.get("text").and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    parts.push(text.trim().to_string());
                }
            }
        }
    }

    parts.join(" ").trim().to_string()
}

fn clean_caption(raw: &str) -> Result<String> {
    let mut text = raw.trim().to_string();
    for prefix in CAPTION_NOISE_PREFIXES {
        if text.to_ascii_lowercase().starts_with(prefix) {
            text = text[prefix.len()..].trim_start().to_string();
        }
    }
    let text = text.trim_end_matches('.').trim().to_string();
    if !text.chars().any(char::is_alphanumeric) {
        bail!("caption was empty after cleanup");
    }
    Ok(truncate_text(&text, CAPTION_MAX_CHARS))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn photo() -> ImagePayload {
        ImagePayload::from_data_url("data:image/png;base64,AAA").unwrap()
    }

    fn captioner(server: &MockServer, token: Option<&str>) -> HuggingFaceCaptioner {
        HuggingFaceCaptioner::new(
            Some(server.uri()),
            Some("Salesforce/blip".to_string()),
            token.map(str::to_string),
            HttpClient::new(),
        )
    }

    #[test]
    fn caption_shapes_normalize_to_first_text() {
        assert_eq!(
            extract_caption_text(&json!([{"generated_text": "a sofa"}])).as_deref(),
            Some("a sofa")
        );
        assert_eq!(
            extract_caption_text(&json!([{"generated_text": " "}, {"caption": "a bed"}])).as_deref(),
            Some("a bed")
        );
        assert_eq!(
            extract_caption_text(&json!({"caption": "", "text": "a desk"})).as_deref(),
            Some("a desk")
        );
        assert_eq!(
            extract_caption_text(&json!({"output": ["a lamp"]})).as_deref(),
            Some("a lamp")
        );
        assert_eq!(extract_caption_text(&json!("a rug")).as_deref(), Some("a rug"));
        assert_eq!(extract_caption_text(&json!({"score": 0.9})), None);
        assert_eq!(extract_caption_text(&json!(42)), None);
    }

    #[test]
    fn clean_caption_strips_model_noise() {
        assert_eq!(
            clean_caption("arafed living room with a couch and a table.").unwrap(),
            "living room with a couch and a table"
        );
        assert_eq!(
            clean_caption("There is a wooden table and two chairs").unwrap(),
            "a wooden table and two chairs"
        );
        assert_eq!(clean_caption("a sofa...").unwrap(), "a sofa");
        assert!(clean_caption(" . ").is_err());
        assert!(clean_caption("...").is_err());
        assert!(clean_caption("- , ;").is_err());
    }

    #[test]
    fn openai_output_text_reads_message_content() {
        let response = json!({
            "output": [{
                "type": "message",
                "content": [{"type": "output_text", "text": "a grey sofa and a floor lamp"}],
            }],
        });
        assert_eq!(extract_openai_output_text(&response), "a grey sofa and a floor lamp");
        assert_eq!(
            extract_openai_output_text(&json!({"output_text": " a bed "})),
            "a bed"
        );
    }

    #[tokio::test]
    async fn huggingface_caption_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/Salesforce/blip"))
            .and(header("authorization", "Bearer hf_test"))
            .and(header("content-type", "image/png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"generated_text": "a wooden table and two chairs"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let description = analyze_scene(
            Some(&captioner(&server, Some("hf_test"))),
            &photo(),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(description.observed(), Some("a wooden table and two chairs"));
    }

    #[tokio::test]
    async fn auth_and_quota_failures_degrade_to_sentinel() {
        for status in [401, 403, 429, 503] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;
            let description =
                analyze_scene(Some(&captioner(&server, None)), &photo(), Duration::from_secs(5))
                    .await;
            assert_eq!(description, SceneDescription::Unavailable, "status {status}");
        }
    }

    #[tokio::test]
    async fn punctuation_caption_degrades_to_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"generated_text": "..."}])),
            )
            .mount(&server)
            .await;
        let description =
            analyze_scene(Some(&captioner(&server, None)), &photo(), Duration::from_secs(5)).await;
        assert_eq!(description, SceneDescription::Unavailable);
    }

    #[tokio::test]
    async fn malformed_body_degrades_to_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>busy</html>"))
            .mount(&server)
            .await;
        let description =
            analyze_scene(Some(&captioner(&server, None)), &photo(), Duration::from_secs(5)).await;
        assert_eq!(description, SceneDescription::Unavailable);
    }

    #[tokio::test]
    async fn slow_provider_times_out_to_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"generated_text": "a sofa"}]))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        let description = analyze_scene(
            Some(&captioner(&server, None)),
            &photo(),
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(description, SceneDescription::Unavailable);
    }

    fn openai(server: &MockServer) -> OpenAiVisionAnalyzer {
        OpenAiVisionAnalyzer::new(
            Some(format!("{}/v1", server.uri())),
            "sk-test".to_string(),
            Some("gpt-test".to_string()),
            HttpClient::new(),
        )
    }

    #[tokio::test]
    async fn openai_sends_image_as_data_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/responses"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-test", "max_output_tokens": 160})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": [{
                    "type": "message",
                    "content": [{"type": "output_text", "text": "A grey sofa and a floor lamp."}],
                }],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let description =
            analyze_scene(Some(&openai(&server)), &photo(), Duration::from_secs(5)).await;
        assert_eq!(description.observed(), Some("A grey sofa and a floor lamp"));

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        let content = &body["input"][0]["content"];
        assert_eq!(content[0]["type"], json!("input_text"));
        assert_eq!(content[1]["type"], json!("input_image"));
        assert_eq!(content[1]["image_url"], json!("data:image/png;base64,AAA="));
    }

    #[tokio::test]
    async fn openai_failures_degrade_to_sentinel() {
        for response in [
            ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "bad key"}})),
            ResponseTemplate::new(200).set_body_json(json!({"output": []})),
            ResponseTemplate::new(200).set_body_string("not json"),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/responses"))
                .respond_with(response)
                .mount(&server)
                .await;
            let description =
                analyze_scene(Some(&openai(&server)), &photo(), Duration::from_secs(5)).await;
            assert_eq!(description, SceneDescription::Unavailable);
        }
    }

    struct CountingAnalyzer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SceneAnalyzer for CountingAnalyzer {
        fn name(&self) -> &str {
            "counting"
        }

        async fn describe(&self, _image: &ImagePayload) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("a room".to_string())
        }
    }

    #[tokio::test]
    async fn disabled_analyzer_and_sentinel_caption_yield_unavailable() {
        let description = analyze_scene(None, &photo(), Duration::from_secs(1)).await;
        assert_eq!(description, SceneDescription::Unavailable);

        let analyzer = CountingAnalyzer {
            calls: AtomicUsize::new(0),
        };
        let description = analyze_scene(Some(&analyzer), &photo(), Duration::from_secs(1)).await;
        assert_eq!(description, SceneDescription::Unavailable);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }
}
