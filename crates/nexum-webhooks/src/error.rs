//! Error types for the webhook gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Webhook gateway error variants.
///
/// Signature failures are not errors: they surface as a rejected
/// disposition so the response stays detail-free.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("No connector registered for provider")]
    UnknownProvider,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// JSON error response returned by the ingest endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            WebhookError::UnknownProvider => (StatusCode::NOT_FOUND, "unknown_provider"),
            WebhookError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "invalid_payload"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type GatewayResult<T> = Result<T, WebhookError>;
