use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use restyle_contracts::jobs::GenerationMode;
use restyle_engine::vision::{
    DEFAULT_HUGGINGFACE_API_BASE, DEFAULT_HUGGINGFACE_CAPTION_MODEL, DEFAULT_OPENAI_API_BASE,
    DEFAULT_OPENAI_VISION_MODEL,
};
use restyle_engine::{ReplicateConfig, DEFAULT_REPLICATE_API_BASE, DEFAULT_REPLICATE_MODEL};
use serde_json::Value;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_PROVIDER: &str = "replicate";

const MIN_POLL_INTERVAL_S: f64 = 0.2;
const MAX_POLL_INTERVAL_S: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionBackend {
    HuggingFace,
    OpenAi,
    Disabled,
}

impl VisionBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HuggingFace => "huggingface",
            Self::OpenAi => "openai",
            Self::Disabled => "none",
        }
    }
}

impl FromStr for VisionBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "openai" => Ok(Self::OpenAi),
            "none" | "off" | "disabled" => Ok(Self::Disabled),
            other => bail!("unknown vision provider '{other}' (expected huggingface, openai or none)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub backend: VisionBackend,
    pub huggingface_api_base: String,
    pub huggingface_model: String,
    pub huggingface_token: Option<String>,
    pub openai_api_base: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub allowed_origin: String,
    pub body_limit: usize,
    pub provider: String,
    pub mode: GenerationMode,
    pub replicate: ReplicateConfig,
    pub vision: VisionConfig,
    pub default_style: Option<String>,
    pub default_room_type: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| first_non_empty(&lookup, keys);

        let port = match get(&["PORT"]) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT must be a port number, got '{raw}'"))?,
            None => DEFAULT_PORT,
        };
        let body_limit = match get(&["BODY_LIMIT_BYTES"]) {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("BODY_LIMIT_BYTES must be a byte count, got '{raw}'"))?,
            None => DEFAULT_BODY_LIMIT_BYTES,
        };
        let mode = match get(&["GENERATION_MODE"]) {
            Some(raw) => raw.parse::<GenerationMode>().map_err(|err| anyhow!("{err}"))?,
            None => GenerationMode::Poll,
        };

        let poll_interval = match get(&["REPLICATE_POLL_INTERVAL"]) {
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .with_context(|| format!("REPLICATE_POLL_INTERVAL must be seconds, got '{raw}'"))?,
            None => 1.0,
        };
        let extra_input = match get(&["REPLICATE_EXTRA_INPUT"]) {
            Some(raw) => match serde_json::from_str::<Value>(&raw)
                .context("REPLICATE_EXTRA_INPUT is not valid JSON")?
            {
                Value::Object(map) => map,
                _ => bail!("REPLICATE_EXTRA_INPUT must be a JSON object"),
            },
            None => Default::default(),
        };
        let replicate = ReplicateConfig {
            api_base: get(&["REPLICATE_API_BASE"])
                .unwrap_or_else(|| DEFAULT_REPLICATE_API_BASE.to_string()),
            api_token: get(&["REPLICATE_API_TOKEN", "REPLICATE_API_KEY"]),
            model: get(&["REPLICATE_MODEL"]).unwrap_or_else(|| DEFAULT_REPLICATE_MODEL.to_string()),
            version: get(&["REPLICATE_MODEL_VERSION"]),
            poll_interval: Duration::from_secs_f64(
                poll_interval.clamp(MIN_POLL_INTERVAL_S, MAX_POLL_INTERVAL_S),
            ),
            extra_input,
        };

        let timeout_s = match get(&["VISION_TIMEOUT_SECS"]) {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("VISION_TIMEOUT_SECS must be whole seconds, got '{raw}'"))?,
            None => 30,
        };
        let vision = VisionConfig {
            backend: match get(&["VISION_PROVIDER"]) {
                Some(raw) => raw.parse()?,
                None => VisionBackend::HuggingFace,
            },
            huggingface_api_base: get(&["HUGGINGFACE_API_BASE"])
                .unwrap_or_else(|| DEFAULT_HUGGINGFACE_API_BASE.to_string()),
            huggingface_model: get(&["HUGGINGFACE_CAPTION_MODEL"])
                .unwrap_or_else(|| DEFAULT_HUGGINGFACE_CAPTION_MODEL.to_string()),
            huggingface_token: get(&["HUGGINGFACE_API_TOKEN", "HF_TOKEN"]),
            openai_api_base: get(&["OPENAI_API_BASE"])
                .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string()),
            openai_api_key: get(&["OPENAI_API_KEY"]),
            openai_model: get(&["OPENAI_VISION_MODEL"])
                .unwrap_or_else(|| DEFAULT_OPENAI_VISION_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_s.max(1)),
        };

        Ok(Self {
            port,
            allowed_origin: get(&["ALLOWED_ORIGIN", "CORS_ORIGIN"]).unwrap_or_else(|| "*".to_string()),
            body_limit,
            provider: get(&["GENERATION_PROVIDER"])
                .map(|value| value.to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            mode,
            replicate,
            vision,
            default_style: get(&["DEFAULT_STYLE"]),
            default_room_type: get(&["DEFAULT_ROOM_TYPE"]),
        })
    }
}

fn first_non_empty<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for &key in keys {
        if let Some(value) = lookup(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() -> Result<()> {
        let config = config_from(&[])?;
        assert_eq!(config.port, 3001);
        assert_eq!(config.allowed_origin, "*");
        assert_eq!(config.body_limit, 10_485_760);
        assert_eq!(config.provider, "replicate");
        assert_eq!(config.mode, GenerationMode::Poll);
        assert_eq!(config.replicate.model, "adirik/interior-design");
        assert_eq!(config.replicate.poll_interval, Duration::from_secs(1));
        assert_eq!(config.vision.backend, VisionBackend::HuggingFace);
        assert_eq!(config.vision.timeout, Duration::from_secs(30));
        assert_eq!(config.default_style, None);
        Ok(())
    }

    #[test]
    fn blank_values_fall_through_to_aliases() -> Result<()> {
        let config = config_from(&[
            ("REPLICATE_API_TOKEN", "  "),
            ("REPLICATE_API_KEY", "r8_key"),
            ("ALLOWED_ORIGIN", ""),
            ("CORS_ORIGIN", "http://localhost:5173"),
            ("HF_TOKEN", "hf_abc"),
        ])?;
        assert_eq!(config.replicate.api_token.as_deref(), Some("r8_key"));
        assert_eq!(config.allowed_origin, "http://localhost:5173");
        assert_eq!(config.vision.huggingface_token.as_deref(), Some("hf_abc"));
        Ok(())
    }

    #[test]
    fn overrides_parse_and_clamp() -> Result<()> {
        let config = config_from(&[
            ("PORT", "8080"),
            ("GENERATION_PROVIDER", "DryRun"),
            ("GENERATION_MODE", "wait"),
            ("REPLICATE_POLL_INTERVAL", "0.01"),
            ("REPLICATE_EXTRA_INPUT", r#"{"num_inference_steps": 30}"#),
            ("VISION_PROVIDER", "none"),
            ("DEFAULT_STYLE", "japandi"),
        ])?;
        assert_eq!(config.port, 8080);
        assert_eq!(config.provider, "dryrun");
        assert_eq!(config.mode, GenerationMode::Wait);
        assert!((config.replicate.poll_interval.as_secs_f64() - 0.2).abs() < 1e-6);
        assert_eq!(config.replicate.extra_input["num_inference_steps"], 30);
        assert_eq!(config.vision.backend, VisionBackend::Disabled);
        assert_eq!(config.default_style.as_deref(), Some("japandi"));
        Ok(())
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(config_from(&[("PORT", "threethousand")]).is_err());
        assert!(config_from(&[("GENERATION_MODE", "stream")]).is_err());
        assert!(config_from(&[("REPLICATE_EXTRA_INPUT", "[1,2]")]).is_err());
        assert!(config_from(&[("VISION_PROVIDER", "clip")]).is_err());
    }
}
