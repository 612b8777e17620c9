use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use restyle_engine::GatewayError;
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn from_status_failure(err: GatewayError) -> Self {
        if err.is_local() {
            return err.into();
        }
        let details = err.details().unwrap_or_else(|| err.to_string());
        error!(error = %err, "redesign status lookup failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch redesign status")
            .with_details(details)
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %err, details = ?err.details(), "redesign request failed");
        }
        Self {
            status,
            error: err.to_string(),
            details: err.details(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_keep_mapped_status_and_details() {
        let err: ApiError = GatewayError::from_provider_status(
            402,
            Some("Monthly spend limit reached".to_string()),
        )
        .into();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.details.as_deref(), Some("Monthly spend limit reached"));
    }

    #[test]
    fn status_failures_collapse_to_500() {
        let err = ApiError::from_status_failure(GatewayError::from_provider_status(404, None));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.details.is_some());

        let err = ApiError::from_status_failure(GatewayError::InvalidInput(
            "Prediction ID is required".to_string(),
        ));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error, "Prediction ID is required");
    }

    #[test]
    fn serialized_body_omits_status_and_empty_details() {
        let body = serde_json::to_value(ApiError::bad_request("Image is required")).unwrap();
        assert_eq!(body, serde_json::json!({"error": "Image is required"}));
    }
}
