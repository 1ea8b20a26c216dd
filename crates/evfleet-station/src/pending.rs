//! Outstanding calls awaiting a result, keyed by correlation id

use evfleet_types::Action;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// A call that has been sent but not yet answered
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub action: Action,
    pub issued_at: Instant,
}

/// Table of unanswered calls
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<String, PendingCall>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, PendingCall>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, unique_id: impl Into<String>, action: Action, issued_at: Instant) {
        self.entries()
            .insert(unique_id.into(), PendingCall { action, issued_at });
    }

    /// Remove and return the call answered by `unique_id`
    pub fn resolve(&self, unique_id: &str) -> Option<PendingCall> {
        self.entries().remove(unique_id)
    }

    /// Drop calls issued more than `timeout` before `now`
    pub fn evict_expired(&self, now: Instant, timeout: Duration) -> Vec<(String, PendingCall)> {
        let mut entries = self.entries();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, call)| now.saturating_duration_since(call.issued_at) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| entries.remove(&id).map(|call| (id, call)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_resolve() {
        let pending = PendingRequests::new();
        let now = Instant::now();
        pending.insert("a", Action::BootNotification, now);
        pending.insert("b", Action::Heartbeat, now);

        let call = pending.resolve("a").unwrap();
        assert_eq!(call.action, Action::BootNotification);
        assert!(pending.resolve("a").is_none());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_evict_expired() {
        let pending = PendingRequests::new();
        let start = Instant::now();
        pending.insert("old", Action::Heartbeat, start);
        pending.insert("new", Action::StatusNotification, start + Duration::from_secs(20));

        let now = start + Duration::from_secs(30);
        let evicted = pending.evict_expired(now, Duration::from_secs(30));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, "old");
        assert_eq!(pending.len(), 1);
        assert!(pending.resolve("new").is_some());
        assert!(pending.is_empty());
    }
}
