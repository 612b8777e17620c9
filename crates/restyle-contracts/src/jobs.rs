use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Poll,
    Wait,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Wait => "wait",
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "poll" | "async" => Ok(Self::Poll),
            "wait" | "sync" => Ok(Self::Wait),
            other => Err(format!("unknown generation mode '{other}' (expected poll or wait)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Unknown,
}

impl JobStatus {
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starting" | "queued" | "pending" => Self::Queued,
            "processing" | "running" | "in_progress" => Self::Running,
            "succeeded" | "success" | "completed" => Self::Succeeded,
            "failed" | "error" => Self::Failed,
            "canceled" | "cancelled" | "aborted" => Self::Canceled,
            _ => Self::Unknown,
        }
    }

    pub fn of_job(job: &Value) -> Self {
        job.get("status")
            .and_then(Value::as_str)
            .map(Self::from_provider)
            .unwrap_or(Self::Unknown)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult {
    Job(Value),
    Completed { url: String },
}

impl GenerationResult {
    pub fn to_response_body(&self) -> Value {
        match self {
            Self::Job(job) => job.clone(),
            Self::Completed { url } => json!({
                "success": true,
                "output": url,
                "imageUrl": url,
            }),
        }
    }
}

pub fn resolve_output_url(output: &Value) -> String {
    if let Some(url) = output
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return url.to_string();
    }
    if let Some(first) = output.as_array().and_then(|rows| rows.first()) {
        return resolve_output_url(first);
    }
    if let Some(text) = output
        .as_str()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return text.to_string();
    }
    output.to_string()
}
