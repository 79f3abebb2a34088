//! Error types for the execution server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use codebox_core::ExecutorError;
use serde_json::json;
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Request body could not be decoded
    #[error("{0}")]
    InvalidRequest(String),

    /// Request body exceeded the configured limit
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Request decoded but failed validation, or the runner was misconfigured
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::PayloadTooLarge(_) => 413,
            ServerError::Executor(ExecutorError::Config(_) | ExecutorError::Io(_)) => 500,
            ServerError::Executor(_) => 400,
            ServerError::Config(_) | ServerError::Internal(_) => 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::PayloadTooLarge(_) => "payload_too_large",
            ServerError::Executor(ExecutorError::Config(_)) => "config_error",
            ServerError::Executor(ExecutorError::Io(_)) => "io_error",
            ServerError::Executor(_) => "validation_error",
            ServerError::Config(_) => "config_error",
            ServerError::Internal(_) => "internal_error",
        }
    }
}

/// Renders as `{"error": <message>}` with the matching status.
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
