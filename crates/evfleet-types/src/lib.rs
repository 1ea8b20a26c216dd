//! # evfleet Types
//!
//! Wire-level data model shared by the simulated charge points and the central
//! system: the JSON array frames (`CALL` / `CALL_RESULT`), the three modeled
//! actions, their payloads, and the station status / command vocabulary.
//!
//! Nothing in this crate performs I/O.

pub mod error;
pub mod message;
pub mod station;
pub mod v16j;

pub use error::*;
pub use message::*;
pub use station::{StationCommand, StationStatus};

/// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

/// WebSocket subprotocol negotiated by both ends
pub const SUB_PROTOCOL: &str = "ocpp1.6";

/// Heartbeat interval, in seconds, used until a boot response says otherwise
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Message type identifier, the first element of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Call = 2,
    CallResult = 3,
}

impl TryFrom<u64> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(MessageType::Call),
            3 => Ok(MessageType::CallResult),
            other => Err(ProtocolError::malformed(format!(
                "unsupported message type {}",
                other
            ))),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(msg_type: MessageType) -> Self {
        msg_type as u8
    }
}

/// Action carried by a `CALL` frame.
///
/// Parsing never fails: names outside the modeled set are kept as
/// [`Action::Unknown`] so the receiver can acknowledge them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    BootNotification,
    Heartbeat,
    StatusNotification,
    Unknown(String),
}

impl Action {
    /// Action name as it appears on the wire
    pub fn as_str(&self) -> &str {
        match self {
            Action::BootNotification => "BootNotification",
            Action::Heartbeat => "Heartbeat",
            Action::StatusNotification => "StatusNotification",
            Action::Unknown(name) => name,
        }
    }

    /// Whether this is one of the modeled actions
    pub fn is_known(&self) -> bool {
        !matches!(self, Action::Unknown(_))
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        match name {
            "BootNotification" => Action::BootNotification,
            "Heartbeat" => Action::Heartbeat,
            "StatusNotification" => Action::StatusNotification,
            other => Action::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format a timestamp the way both ends put it on the wire
/// (`2024-05-01T12:00:00Z`).
pub fn wire_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
