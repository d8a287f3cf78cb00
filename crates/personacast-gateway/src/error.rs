//! Gateway error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use personacast_delivery::{DeliveryError, ErrorCategory};
use thiserror::Error;

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Delivery error.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Not found error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Delivery(e) => match e {
                DeliveryError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                DeliveryError::PayloadRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
                DeliveryError::Attachment(_) => StatusCode::BAD_REQUEST,
                e if e.category() == ErrorCategory::Platform => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({ "error": self.to_string() });
        if let Self::Delivery(e) = &self {
            body["category"] = e.category().as_str().into();
            if let Some(delay) = e.retry_delay() {
                body["retry_after_ms"] = (delay.as_millis() as u64).into();
            }
        }
        (status, Json(body)).into_response()
    }
}
