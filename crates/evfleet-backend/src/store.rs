//! Station records, the event log and the storage seam

use crate::error::BackendResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use evfleet_types::StationStatus;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Vendor and model recorded when a station announces itself without them
pub const UNKNOWN: &str = "Unknown";

/// Persisted state of one station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub cp_id: String,
    pub vendor: String,
    pub model: String,
    pub status: StationStatus,
    pub last_seen: Option<DateTime<Utc>>,
    /// Always `status.is_busy()`
    pub busy: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl StationRecord {
    /// A freshly booted station: Available, idle, no heartbeat yet
    pub fn booted(
        cp_id: impl Into<String>,
        vendor: impl Into<String>,
        model: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            cp_id: cp_id.into(),
            vendor: vendor.into(),
            model: model.into(),
            status: StationStatus::Available,
            last_seen: Some(now),
            busy: false,
            last_heartbeat: None,
        }
    }

    pub fn set_status(&mut self, status: StationStatus, now: DateTime<Utc>) {
        self.status = status;
        self.busy = status.is_busy();
        self.last_seen = Some(now);
    }

    /// Idle and silent for at least `threshold`
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        !self.busy
            && self
                .last_heartbeat
                .map_or(true, |last| last + threshold <= now)
    }
}

/// Kind of a logged event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    BootNotification,
    Heartbeat,
    StatusNotification,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BootNotification => "BootNotification",
            EventKind::Heartbeat => "Heartbeat",
            EventKind::StatusNotification => "StatusNotification",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "BootNotification" => Some(EventKind::BootNotification),
            "Heartbeat" => Some(EventKind::Heartbeat),
            "StatusNotification" => Some(EventKind::StatusNotification),
            _ => None,
        }
    }
}

/// One line of the append-only event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub cp_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl EventLogEntry {
    pub fn boot(cp_id: &str, vendor: &str, model: &str, at: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::BootNotification,
            cp_id: cp_id.to_string(),
            message: format!("{} {}", vendor, model),
            timestamp: at,
        }
    }

    pub fn heartbeat(cp_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Heartbeat,
            cp_id: cp_id.to_string(),
            message: "Heartbeat received".to_string(),
            timestamp: at,
        }
    }

    pub fn status(cp_id: &str, status: StationStatus, at: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::StatusNotification,
            cp_id: cp_id.to_string(),
            message: format!("Status: {}", status),
            timestamp: at,
        }
    }
}

/// Storage behind the ingest routes and the liveness monitor.
///
/// Every method touches a single station row, so implementations only need
/// per-row atomicity.
#[async_trait]
pub trait StationStore: Send + Sync {
    /// Reset the station to a fresh boot, creating it if needed
    async fn record_boot(
        &self,
        cp_id: &str,
        vendor: &str,
        model: &str,
        now: DateTime<Utc>,
    ) -> BackendResult<StationRecord>;

    /// Stamp a heartbeat. Returns false for an unknown station, which is
    /// left uncreated.
    async fn record_heartbeat(&self, cp_id: &str, now: DateTime<Utc>) -> BackendResult<bool>;

    /// Apply a status report, creating the station if needed
    async fn record_status(
        &self,
        cp_id: &str,
        status: StationStatus,
        now: DateTime<Utc>,
    ) -> BackendResult<StationRecord>;

    async fn station(&self, cp_id: &str) -> BackendResult<Option<StationRecord>>;

    /// Sorted station ids
    async fn station_ids(&self) -> BackendResult<Vec<String>>;

    /// Logged events, newest first
    async fn events(&self, limit: Option<usize>) -> BackendResult<Vec<EventLogEntry>>;

    /// If the station is idle and its last heartbeat is missing or at
    /// least `threshold` old, stamp a heartbeat at `now` and log it. The
    /// check and the write are one atomic step.
    async fn refresh_if_stale(
        &self,
        cp_id: &str,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> BackendResult<bool>;

    /// Insert or overwrite a record as is
    async fn insert_station(&self, record: StationRecord) -> BackendResult<()>;
}

/// Events kept by [`MemoryStore`] before the oldest are discarded
pub const MEMORY_EVENT_CAPACITY: usize = 10_000;

/// Process-local store
#[derive(Debug)]
pub struct MemoryStore {
    stations: DashMap<String, StationRecord>,
    events: Mutex<VecDeque<EventLogEntry>>,
    event_capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_event_capacity(MEMORY_EVENT_CAPACITY)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        Self {
            stations: DashMap::new(),
            events: Mutex::new(VecDeque::new()),
            event_capacity: capacity.max(1),
        }
    }

    fn log(&self, entry: EventLogEntry) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        if events.len() >= self.event_capacity {
            events.pop_front();
        }
        events.push_back(entry);
    }
}

#[async_trait]
impl StationStore for MemoryStore {
    async fn record_boot(
        &self,
        cp_id: &str,
        vendor: &str,
        model: &str,
        now: DateTime<Utc>,
    ) -> BackendResult<StationRecord> {
        let record = StationRecord::booted(cp_id, vendor, model, now);
        self.stations.insert(cp_id.to_string(), record.clone());
        self.log(EventLogEntry::boot(cp_id, vendor, model, now));
        Ok(record)
    }

    async fn record_heartbeat(&self, cp_id: &str, now: DateTime<Utc>) -> BackendResult<bool> {
        let known = match self.stations.get_mut(cp_id) {
            Some(mut record) => {
                record.last_heartbeat = Some(now);
                record.last_seen = Some(now);
                true
            }
            None => false,
        };
        self.log(EventLogEntry::heartbeat(cp_id, now));
        Ok(known)
    }

    async fn record_status(
        &self,
        cp_id: &str,
        status: StationStatus,
        now: DateTime<Utc>,
    ) -> BackendResult<StationRecord> {
        let record = {
            let mut entry = self
                .stations
                .entry(cp_id.to_string())
                .or_insert_with(|| StationRecord {
                    last_seen: None,
                    ..StationRecord::booted(cp_id, UNKNOWN, UNKNOWN, now)
                });
            entry.set_status(status, now);
            entry.clone()
        };
        self.log(EventLogEntry::status(cp_id, status, now));
        Ok(record)
    }

    async fn station(&self, cp_id: &str) -> BackendResult<Option<StationRecord>> {
        Ok(self.stations.get(cp_id).map(|record| record.clone()))
    }

    async fn station_ids(&self) -> BackendResult<Vec<String>> {
        let mut ids: Vec<String> = self.stations.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn events(&self, limit: Option<usize>) -> BackendResult<Vec<EventLogEntry>> {
        let events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut newest_first: Vec<EventLogEntry> = events.iter().rev().cloned().collect();
        // stable, so equal timestamps keep insertion order reversed
        newest_first.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            newest_first.truncate(limit);
        }
        Ok(newest_first)
    }

    async fn refresh_if_stale(
        &self,
        cp_id: &str,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> BackendResult<bool> {
        let refreshed = match self.stations.get_mut(cp_id) {
            Some(mut record) if record.is_stale(now, threshold) => {
                record.last_heartbeat = Some(now);
                true
            }
            _ => false,
        };
        if refreshed {
            self.log(EventLogEntry::heartbeat(cp_id, now));
        }
        Ok(refreshed)
    }

    async fn insert_station(&self, record: StationRecord) -> BackendResult<()> {
        self.stations.insert(record.cp_id.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_boot_resets_station() {
        let store = MemoryStore::new();
        store
            .record_status("EVC_1", StationStatus::Charging, at(0))
            .await
            .unwrap();
        store.record_heartbeat("EVC_1", at(1)).await.unwrap();

        let record = store
            .record_boot("EVC_1", "MyVendor", "MyModel", at(2))
            .await
            .unwrap();
        assert_eq!(record.status, StationStatus::Available);
        assert!(!record.busy);
        assert_eq!(record.last_heartbeat, None);
        assert_eq!(record.last_seen, Some(at(2)));
        assert_eq!(store.station("EVC_1").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_status_tracks_busy_and_creates_unknown_stations() {
        let store = MemoryStore::new();
        let record = store
            .record_status("EVC_7", StationStatus::Charging, at(0))
            .await
            .unwrap();
        assert!(record.busy);
        assert_eq!(record.vendor, UNKNOWN);

        let record = store
            .record_status("EVC_7", StationStatus::SuspendedEV, at(1))
            .await
            .unwrap();
        assert!(!record.busy);
        assert_eq!(record.last_seen, Some(at(1)));
    }

    #[tokio::test]
    async fn test_heartbeat_for_unknown_station_creates_nothing() {
        let store = MemoryStore::new();
        assert!(!store.record_heartbeat("ghost", at(0)).await.unwrap());
        assert!(store.station("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_if_stale() {
        let store = MemoryStore::new();
        let threshold = Duration::seconds(60);
        store
            .record_boot("EVC_1", "V", "M", at(0))
            .await
            .unwrap();

        // never heard a heartbeat
        assert!(store.refresh_if_stale("EVC_1", at(1), threshold).await.unwrap());
        // fresh now
        assert!(!store.refresh_if_stale("EVC_1", at(30), threshold).await.unwrap());
        // exactly at the threshold
        assert!(store.refresh_if_stale("EVC_1", at(61), threshold).await.unwrap());

        store
            .record_status("EVC_1", StationStatus::Charging, at(62))
            .await
            .unwrap();
        assert!(!store.refresh_if_stale("EVC_1", at(500), threshold).await.unwrap());
        assert!(!store.refresh_if_stale("missing", at(500), threshold).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_synthesizes_one_heartbeat() {
        let store = Arc::new(MemoryStore::new());
        store.record_boot("EVC_1", "V", "M", at(0)).await.unwrap();

        let now = at(120);
        let attempts: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .refresh_if_stale("EVC_1", now, Duration::seconds(60))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut refreshed = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                refreshed += 1;
            }
        }
        assert_eq!(refreshed, 1);

        let heartbeats = store
            .events(None)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EventKind::Heartbeat)
            .count();
        assert_eq!(heartbeats, 1);
    }

    #[tokio::test]
    async fn test_event_log_is_capped() {
        let store = MemoryStore::with_event_capacity(3);
        for secs in 0..5 {
            store.record_heartbeat("EVC_1", at(secs)).await.unwrap();
        }

        let events = store.events(None).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].timestamp, at(4));
        assert_eq!(events[2].timestamp, at(2));
    }

    #[tokio::test]
    async fn test_events_newest_first() {
        let store = MemoryStore::new();
        store.record_boot("EVC_1", "V", "M", at(0)).await.unwrap();
        store
            .record_status("EVC_1", StationStatus::Charging, at(5))
            .await
            .unwrap();
        store.record_heartbeat("EVC_1", at(3)).await.unwrap();

        let events = store.events(None).await.unwrap();
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::StatusNotification,
                EventKind::Heartbeat,
                EventKind::BootNotification
            ]
        );
        assert_eq!(events[0].message, "Status: Charging");
        assert_eq!(events[2].message, "V M");
        assert_eq!(store.events(Some(1)).await.unwrap().len(), 1);
    }

    #[test]
    fn test_event_entry_serialization() {
        let entry = EventLogEntry::heartbeat("EVC_1", at(0));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "Heartbeat");
        assert_eq!(value["cp_id"], "EVC_1");
    }
}
