//! Error types for frame handling

use thiserror::Error;

/// Errors raised while decoding or encoding frames
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Unparseable or underspecified frame. The owning connection drops the
    /// frame and keeps running.
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// Payload could not be converted to or from its typed form
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl ProtocolError {
    /// Create a malformed frame error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Whether this error only concerns a single frame
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self, Self::MalformedFrame { .. })
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for frame operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
