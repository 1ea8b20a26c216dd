//! # evfleet Central System
//!
//! The server side of the simulator. Stations connect over WebSocket with
//! their id as the request path; the server answers each call from a
//! fixed dispatch table and forwards the processed event to an HTTP relay
//! sink in the background.
//!
//! ## Features
//!
//! - **Session registry**: one live connection per station id, last writer wins
//! - **Dispatch**: BootNotification, Heartbeat and StatusNotification, with
//!   `{}` for anything else
//! - **Relay**: bounded queue drained by a fixed worker pool
//! - **Metrics**: Prometheus counters on an optional HTTP port

pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use dispatch::{handle_text, process_call, Dispatched};
pub use error::*;
pub use metrics::ServerMetrics;
pub use registry::{SessionHandle, SessionRegistry};
pub use relay::{HttpRelay, RelayEvent, RelayQueue, RelaySink};
pub use server::CsmsServer;
pub use session::{run_session, SessionContext, SessionEnd};
