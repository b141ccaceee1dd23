//! Error types for chatrelay
//!
//! Failures that occur before streaming begins surface as a single JSON
//! `{"error": "..."}` body with a status from the taxonomy below. Failures
//! after streaming begins are handled inside the relay and never reach this
//! type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from the upstream API. The body has already been
    /// drained and logged; only the status is mirrored to the client.
    #[error("Upstream API error: {status}")]
    Upstream { status: u16, body: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::StreamNotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Dns(_) | AppError::ConnectionRefused(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Network(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponse {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
