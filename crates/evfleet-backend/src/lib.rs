//! # evfleet Backend
//!
//! Receives events relayed by the central system, keeps one record per
//! station, and queues operator commands that stations poll for. A
//! liveness monitor stamps heartbeats for idle stations that went quiet.

pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod ingest;
pub mod monitor;
pub mod store;

pub use commands::CommandQueue;
pub use config::{BackendConfig, StorageKind};
pub use database::{DatabaseConfig, SqliteStore};
pub use error::*;
pub use ingest::{router, AppState};
pub use monitor::LivenessMonitor;
pub use store::{EventKind, EventLogEntry, MemoryStore, StationRecord, StationStore};

use std::sync::Arc;

/// Open the configured store
pub async fn open_store(config: &BackendConfig) -> BackendResult<Arc<dyn StationStore>> {
    let store: Arc<dyn StationStore> = match config.storage {
        StorageKind::Memory => Arc::new(MemoryStore::new()),
        StorageKind::Sqlite => Arc::new(SqliteStore::connect(&config.database).await?),
    };
    Ok(store)
}
