//! # evfleet Station
//!
//! Simulated charge points. Each station keeps one WebSocket session to the
//! central system alive:
//!
//! - announces itself with BootNotification and its current status
//! - sends Heartbeat at the server-negotiated interval while Available
//! - polls an HTTP endpoint for operator commands (`start`, `suspend`,
//!   `finish`) and reports the resulting status
//! - reconnects after a fixed delay whenever the session fails

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod heartbeat;
pub mod outbox;
pub mod pending;
pub mod session;
pub mod state;

pub use commands::{apply_command, CommandSource, HttpCommandSource};
pub use config::{FleetConfig, StationConfig, VendorInfo};
pub use engine::{Fleet, StationEngine};
pub use error::{StationError, StationResult};
pub use pending::{PendingCall, PendingRequests};
pub use session::{InboundOutcome, Session};
pub use state::StationState;
