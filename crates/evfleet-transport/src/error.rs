//! Transport layer error types

use thiserror::Error;

/// Transport layer errors. Any of these ends the session it occurred in.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// TCP or WebSocket connection error
    #[error("WebSocket connection error: {message}")]
    ConnectionError { message: String },

    /// Malformed URL
    #[error("Invalid URL: {message}")]
    InvalidUrl { message: String },

    /// WebSocket protocol violation
    #[error("WebSocket protocol error: {message}")]
    ProtocolError { message: String },

    /// Message too large
    #[error("Message too large: {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    /// Connection timeout
    #[error("Connection timeout after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Connection closed by either end
    #[error("Connection closed: {reason}")]
    ConnectionClosed { reason: String },

    /// IO error
    #[error("IO error: {message}")]
    IoError { message: String },

    /// TLS setup or negotiation error
    #[error("TLS error: {message}")]
    TlsError { message: String },

    /// Handshake rejected or failed
    #[error("WebSocket handshake error: {message}")]
    HandshakeError { message: String },
}

impl TransportError {
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }

    /// Orderly close rather than a failure
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed { .. })
    }

    pub fn handshake(message: impl Into<String>) -> Self {
        Self::HandshakeError {
            message: message.into(),
        }
    }

    pub fn tls(message: impl Into<String>) -> Self {
        Self::TlsError {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<native_tls::Error> for TransportError {
    fn from(err: native_tls::Error) -> Self {
        TransportError::tls(err.to_string())
    }
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        TransportError::InvalidUrl {
            message: err.to_string(),
        }
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed => {
                TransportError::closed("WebSocket connection closed")
            }
            tungstenite::Error::AlreadyClosed => TransportError::closed("WebSocket already closed"),
            tungstenite::Error::Protocol(msg) => TransportError::ProtocolError {
                message: msg.to_string(),
            },
            tungstenite::Error::Io(io_err) => TransportError::IoError {
                message: io_err.to_string(),
            },
            tungstenite::Error::Tls(tls_err) => TransportError::tls(tls_err.to_string()),
            tungstenite::Error::Url(url_err) => TransportError::InvalidUrl {
                message: url_err.to_string(),
            },
            tungstenite::Error::Http(response) => {
                TransportError::handshake(format!("server answered HTTP {}", response.status()))
            }
            tungstenite::Error::Capacity(capacity) => TransportError::ProtocolError {
                message: capacity.to_string(),
            },
            other => TransportError::ConnectionError {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::MessageTooLarge {
            size: 100000,
            limit: 65536,
        };
        let message = error.to_string();
        assert!(message.contains("100000"));
        assert!(message.contains("65536"));
    }

    #[test]
    fn test_error_conversion_from_io() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Connection refused");
        let transport_error = TransportError::from(io_error);

        match transport_error {
            TransportError::IoError { message } => {
                assert!(message.contains("Connection refused"));
            }
            _ => panic!("Expected IoError"),
        }
    }

    #[test]
    fn test_error_conversion_from_url() {
        let parse_error = url::Url::parse("not a url").unwrap_err();
        assert!(matches!(
            TransportError::from(parse_error),
            TransportError::InvalidUrl { .. }
        ));
    }

    #[test]
    fn test_error_conversion_from_tungstenite() {
        let ws_error = tungstenite::Error::ConnectionClosed;
        let transport_error = TransportError::from(ws_error);

        match transport_error {
            TransportError::ConnectionClosed { reason } => {
                assert!(reason.contains("closed"));
            }
            _ => panic!("Expected ConnectionClosed"),
        }
    }
}
