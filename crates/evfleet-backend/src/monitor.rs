//! Liveness monitor
//!
//! Periodically stamps a heartbeat for idle stations that have gone quiet,
//! so the event log keeps showing them alive. Charging stations are left
//! alone.

use crate::error::BackendResult;
use crate::store::StationStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(60);

pub struct LivenessMonitor {
    store: Arc<dyn StationStore>,
    period: Duration,
    staleness: chrono::Duration,
}

impl LivenessMonitor {
    pub fn new(store: Arc<dyn StationStore>, period: Duration, staleness: Duration) -> Self {
        Self {
            store,
            period,
            staleness: chrono::Duration::from_std(staleness)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
        }
    }

    pub fn with_defaults(store: Arc<dyn StationStore>) -> Self {
        Self::new(store, DEFAULT_PERIOD, DEFAULT_STALENESS)
    }

    /// One pass over every station. Returns the ids that got a synthesized
    /// heartbeat; a failure on one station does not stop the pass.
    pub async fn sweep(&self, now: DateTime<Utc>) -> BackendResult<Vec<String>> {
        let mut refreshed = Vec::new();
        for cp_id in self.store.station_ids().await? {
            match self.store.refresh_if_stale(&cp_id, now, self.staleness).await {
                Ok(true) => {
                    info!("Heartbeat sent for {}", cp_id);
                    refreshed.push(cp_id);
                }
                Ok(false) => {}
                Err(e) => warn!("Liveness check for {} failed: {}", cp_id, e),
            }
        }
        Ok(refreshed)
    }

    /// Sweep every period until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Liveness monitor started: period {:?}, staleness {}s",
            self.period,
            self.staleness.num_seconds()
        );
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.sweep(Utc::now()).await {
                Ok(refreshed) if !refreshed.is_empty() => {
                    debug!("Liveness sweep refreshed {} stations", refreshed.len())
                }
                Ok(_) => {}
                Err(e) => error!("Heartbeat loop error: {}", e),
            }
        }
        info!("Liveness monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::store::{EventKind, MemoryStore, StationRecord};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use evfleet_types::StationStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_busy_station_is_never_touched() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_station(StationRecord {
                status: StationStatus::Charging,
                busy: true,
                last_heartbeat: Some(at(0)),
                ..StationRecord::booted("EVC_1", "V", "M", at(0))
            })
            .await
            .unwrap();
        let monitor = LivenessMonitor::with_defaults(store.clone());

        assert!(monitor.sweep(at(3600)).await.unwrap().is_empty());
        let record = store.station("EVC_1").await.unwrap().unwrap();
        assert_eq!(record.last_heartbeat, Some(at(0)));
        assert!(store.events(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_idle_station_without_heartbeat_gets_one() {
        let store = Arc::new(MemoryStore::new());
        store.record_boot("EVC_1", "V", "M", at(0)).await.unwrap();
        store.record_boot("EVC_2", "V", "M", at(0)).await.unwrap();
        store.record_heartbeat("EVC_2", at(30)).await.unwrap();
        let monitor = LivenessMonitor::with_defaults(store.clone());

        assert_eq!(monitor.sweep(at(40)).await.unwrap(), vec!["EVC_1"]);
        let record = store.station("EVC_1").await.unwrap().unwrap();
        assert_eq!(record.last_heartbeat, Some(at(40)));

        assert!(monitor.sweep(at(45)).await.unwrap().is_empty());
        assert_eq!(monitor.sweep(at(100)).await.unwrap(), vec!["EVC_1", "EVC_2"]);

        let synthesized = store
            .events(None)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EventKind::Heartbeat && e.timestamp >= at(40))
            .count();
        assert_eq!(synthesized, 3);
    }

    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl StationStore for FlakyStore {
        async fn record_boot(
            &self,
            cp_id: &str,
            vendor: &str,
            model: &str,
            now: DateTime<Utc>,
        ) -> BackendResult<StationRecord> {
            self.inner.record_boot(cp_id, vendor, model, now).await
        }
        async fn record_heartbeat(&self, cp_id: &str, now: DateTime<Utc>) -> BackendResult<bool> {
            self.inner.record_heartbeat(cp_id, now).await
        }
        async fn record_status(
            &self,
            cp_id: &str,
            status: StationStatus,
            now: DateTime<Utc>,
        ) -> BackendResult<StationRecord> {
            self.inner.record_status(cp_id, status, now).await
        }
        async fn station(&self, cp_id: &str) -> BackendResult<Option<StationRecord>> {
            self.inner.station(cp_id).await
        }
        async fn station_ids(&self) -> BackendResult<Vec<String>> {
            if self.failures.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(BackendError::Database {
                    message: "database is locked".to_string(),
                });
            }
            self.inner.station_ids().await
        }
        async fn events(&self, limit: Option<usize>) -> BackendResult<Vec<crate::store::EventLogEntry>> {
            self.inner.events(limit).await
        }
        async fn refresh_if_stale(
            &self,
            cp_id: &str,
            now: DateTime<Utc>,
            threshold: chrono::Duration,
        ) -> BackendResult<bool> {
            self.inner.refresh_if_stale(cp_id, now, threshold).await
        }
        async fn insert_station(&self, record: StationRecord) -> BackendResult<()> {
            self.inner.insert_station(record).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_failed_sweep() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(0),
        });
        store.record_boot("EVC_1", "V", "M", Utc::now()).await.unwrap();

        let monitor = Arc::new(LivenessMonitor::new(
            store.clone(),
            Duration::from_secs(10),
            Duration::from_secs(60),
        ));
        let cancel = CancellationToken::new();
        let task = {
            let monitor = monitor.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { monitor.run(cancel).await })
        };

        // first tick fails, second tick refreshes
        tokio::time::sleep(Duration::from_secs(15)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let record = store.station("EVC_1").await.unwrap().unwrap();
        assert!(record.last_heartbeat.is_some());
        assert!(store.failures.load(Ordering::SeqCst) >= 2);

        cancel.cancel();
        task.await.unwrap();
    }
}
