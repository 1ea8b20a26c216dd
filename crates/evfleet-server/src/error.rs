//! Error types for the central system

use thiserror::Error;

/// Main error type for server operations
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Transport error
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Protocol error
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Metrics error
    #[error("Metrics error: {message}")]
    Metrics { message: String },

    /// I/O error
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl ServerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ServerError::Configuration {
            message: message.into(),
        }
    }
}

impl From<evfleet_transport::TransportError> for ServerError {
    fn from(err: evfleet_transport::TransportError) -> Self {
        ServerError::Transport {
            message: err.to_string(),
        }
    }
}

impl From<evfleet_types::ProtocolError> for ServerError {
    fn from(err: evfleet_types::ProtocolError) -> Self {
        ServerError::Protocol {
            message: err.to_string(),
        }
    }
}

impl From<prometheus::Error> for ServerError {
    fn from(err: prometheus::Error) -> Self {
        ServerError::Metrics {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Failure to hand an event to the relay sink. Logged and dropped, never
/// surfaced to a station.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Sink unreachable or timed out
    #[error("Relay request failed: {message}")]
    Request { message: String },

    /// Sink answered with an error status
    #[error("Relay endpoint {endpoint} answered {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Request {
            message: err.to_string(),
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
