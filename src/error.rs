//! Error taxonomy shared by the services and the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Bad input shape, size or type (400)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Request body over the configured limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Unknown id (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid lifecycle transition (409)
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Analysis provider or auth service failure (502)
    #[error("Upstream failure: {0}")]
    Upstream(#[from] ProviderError),

    /// Polling exhausted its attempts (504). The job may still finish later.
    #[error("Gave up after {attempts} poll attempts; {id} is still processing")]
    Timeout { id: String, attempts: u32 },

    /// Missing or unknown bearer token (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Identity lacks the required role or ownership (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::StateConflict(_) => "STATE_CONFLICT",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StateConflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Database(_) | AppError::Io(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn not_found(id: &str) -> Self {
        AppError::NotFound(format!("submission {}", id))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        } else {
            tracing::debug!(code = self.code(), "{}", self);
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
