use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Image generation quota or rate limit exceeded; check billing and retry later")]
    QuotaExceeded { details: Option<String> },
    #[error("Image generation model or version not found")]
    NotFound { details: Option<String> },
    #[error("Image generation parameters were rejected by the provider")]
    Validation { details: Option<String> },
    #[error("Image generation request was malformed")]
    BadRequest { details: Option<String> },
    #[error("Image generation failed")]
    Upstream {
        status: Option<u16>,
        details: Option<String>,
    },
    #[error("Image generation provider is not configured: {0}")]
    Configuration(String),
    #[error("Image generation provider could not be reached")]
    Transport(#[from] reqwest::Error),
}

impl GatewayError {
    pub fn from_provider_status(status: u16, details: Option<String>) -> Self {
        match status {
            402 | 429 => Self::QuotaExceeded { details },
            404 => Self::NotFound { details },
            422 => Self::Validation { details },
            400 => Self::BadRequest { details },
            other => Self::Upstream {
                status: Some(other),
                details,
            },
        }
    }

    pub fn upstream(details: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            details: Some(details.into()),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::BadRequest { .. } => 400,
            Self::QuotaExceeded { .. } => 429,
            Self::NotFound { .. } => 404,
            Self::Validation { .. } => 422,
            Self::Upstream { .. } | Self::Configuration(_) | Self::Transport(_) => 500,
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            Self::QuotaExceeded { details }
            | Self::NotFound { details }
            | Self::Validation { details }
            | Self::BadRequest { details }
            | Self::Upstream { details, .. } => details.clone(),
            Self::Transport(err) => Some(err.to_string()),
            Self::InvalidInput(_) | Self::Configuration(_) => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

pub(crate) fn provider_error_details(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        for key in ["detail", "error", "title", "message"] {
            let text = match parsed.get(key) {
                Some(Value::String(text)) => Some(text.trim().to_string()),
                Some(Value::Object(obj)) => obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(|text| text.trim().to_string()),
                _ => None,
            };
            if let Some(text) = text.filter(|value| !value.is_empty()) {
                return Some(truncate_text(&text, 512));
            }
        }
    }
    Some(truncate_text(trimmed, 512))
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
