//! Live session registry
//!
//! Maps a station id to the one connection currently speaking for it. A new
//! connection for the same id replaces the old entry, and the old
//! connection's cleanup can only remove its own entry.

use dashmap::DashMap;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handle to a live session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub connection_id: Uuid,
    pub peer: Option<SocketAddr>,
    pub connected_at: chrono::DateTime<chrono::Utc>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn new(peer: Option<SocketAddr>, cancel: CancellationToken) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            peer,
            connected_at: chrono::Utc::now(),
            cancel,
        }
    }

    /// Ask the session to close its socket
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Station id to live session
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `station_id`, returning the session it
    /// displaced. The displaced session is told to close.
    pub fn register(&self, station_id: &str, handle: SessionHandle) -> Option<SessionHandle> {
        let displaced = self.sessions.insert(station_id.to_string(), handle);
        if let Some(old) = &displaced {
            old.close();
        }
        displaced
    }

    /// Remove the entry for `station_id` only while it still belongs to
    /// `connection_id`
    pub fn remove_if_current(&self, station_id: &str, connection_id: Uuid) -> bool {
        self.sessions
            .remove_if(station_id, |_, handle| handle.connection_id == connection_id)
            .is_some()
    }

    pub fn get(&self, station_id: &str) -> Option<SessionHandle> {
        self.sessions.get(station_id).map(|entry| entry.clone())
    }

    pub fn contains(&self, station_id: &str) -> bool {
        self.sessions.contains_key(station_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sorted ids of connected stations
    pub fn station_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Close every session; entries are removed by the sessions themselves
    pub fn close_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().close();
        }
    }
}
