//! Error types for the relay sink

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Main error type for backend operations
#[derive(Error, Debug)]
pub enum BackendError {
    /// Database error
    #[error("Database error: {message}")]
    Database { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Request rejected
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Stored data could not be decoded
    #[error("Corrupt record for {cp_id}: {message}")]
    CorruptRecord { cp_id: String, message: String },

    /// I/O error
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl BackendError {
    pub fn validation(message: impl Into<String>) -> Self {
        BackendError::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        BackendError::Configuration {
            message: message.into(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            BackendError::Validation { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        BackendError::Database {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io {
            message: err.to_string(),
        }
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let message = match &self {
            BackendError::Validation { message } => message.clone(),
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
