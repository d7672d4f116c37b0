//! Error types for the transcription queue service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for queue operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transcription queue errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad task-creation or upload input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown task id or out-of-range file index
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unknown or infeasible model identifier
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Per-file transcription failure; recorded as the file's error,
    /// never propagated past the worker loop
    #[error("Engine error: {0}")]
    Engine(String),

    /// Fatal task-store inconsistency
    #[error("Store error: {0}")]
    Store(String),

    /// Queue at capacity; submission rejected rather than blocked
    #[error("Queue full: {0}")]
    QueueFull(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an invalid-model error
    pub fn invalid_model(message: impl Into<String>) -> Self {
        Self::InvalidModel(message.into())
    }

    /// Create an engine error
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a queue-full error
    pub fn queue_full(message: impl Into<String>) -> Self {
        Self::QueueFull(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::BAD_REQUEST, "config_error", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            Error::NotFound(msg) => {
                (StatusCode::NOT_FOUND, "not_found", msg.clone())
            }
            Error::InvalidModel(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_model", msg.clone())
            }
            Error::Engine(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "engine_error", msg.clone())
            }
            Error::Store(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg.clone())
            }
            Error::QueueFull(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "queue_full", msg.clone())
            }
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                err.to_string(),
            ),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
