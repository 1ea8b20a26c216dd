//! # evfleet Transport
//!
//! WebSocket plumbing shared by the simulated stations and the central
//! system: handshakes tagged with the `ocpp1.6` subprotocol, TLS setup on
//! both ends, and classification of inbound socket messages.

pub mod client;
pub mod error;
pub mod server;
pub mod tls;
pub mod websocket;

pub use client::{connect, ClientSocket};
pub use error::*;
pub use server::{accept, Accepted};
pub use tls::{ClientTls, ServerTls};
pub use websocket::{classify, text_message, Inbound};

use std::time::Duration;
use tungstenite::protocol::WebSocketConfig;

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Handshake timeout
    pub connection_timeout: Duration,
    /// WebSocket sub-protocol offered by clients and echoed by the server
    pub sub_protocol: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: 65536, // 64KB
            connection_timeout: Duration::from_secs(30),
            sub_protocol: evfleet_types::SUB_PROTOCOL.to_string(),
        }
    }
}

impl TransportConfig {
    /// Socket-level limits handed to tungstenite
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            max_message_size: Some(self.max_message_size),
            max_frame_size: Some(self.max_message_size),
            accept_unmasked_frames: false,
            ..Default::default()
        }
    }
}

/// Utility functions
pub mod utils {
    /// Extract the station identifier from a WebSocket request path.
    ///
    /// The identifier is the whole path with leading and trailing slashes
    /// removed, so `/EVC_1/` yields `EVC_1` while `/siteA/EVC_1` stays
    /// `siteA/EVC_1`. Query strings are ignored.
    pub fn station_id_from_path(path: &str) -> Option<&str> {
        let path = path.split('?').next().unwrap_or_default();
        Some(path.trim_matches('/')).filter(|id| !id.is_empty())
    }

    /// Build the URL a station connects to
    pub fn station_url(base_url: &str, station_id: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), station_id)
    }

    /// Whether a `Sec-WebSocket-Protocol` header value offers `protocol`
    pub fn offers_subprotocol(header: &str, protocol: &str) -> bool {
        header.split(',').any(|offered| offered.trim() == protocol)
    }
}
