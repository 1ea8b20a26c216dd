//! # Station Error Handling

use evfleet_transport::TransportError;
use evfleet_types::ProtocolError;
use thiserror::Error;

/// Station error types
#[derive(Error, Debug)]
pub enum StationError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Transport failure; ends the current session
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Frame could not be built or parsed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Session is gone; outbound calls are refused until reconnect
    #[error("Station {station_id} is not connected")]
    NotConnected { station_id: String },

    /// Command source failed
    #[error("Command source error: {0}")]
    CommandSourceError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),
}

impl StationError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }

    /// Create a not connected error
    pub fn not_connected(station_id: impl Into<String>) -> Self {
        Self::NotConnected {
            station_id: station_id.into(),
        }
    }

    /// Create a command source error
    pub fn command_source(message: impl Into<String>) -> Self {
        Self::CommandSourceError(message.into())
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::IoError(message.into())
    }

    /// Whether the station should drop its session and reconnect
    pub fn ends_session(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotConnected { .. })
    }
}

impl From<reqwest::Error> for StationError {
    fn from(err: reqwest::Error) -> Self {
        Self::CommandSourceError(err.to_string())
    }
}

/// Result type for station operations
pub type StationResult<T> = Result<T, StationError>;
