//! Per-station state that outlives individual sessions

use evfleet_types::StationStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Status, connectivity and negotiated heartbeat interval of one station.
///
/// The interval is published on a watch channel so the heartbeat
/// scheduler picks up changes on its next cycle.
#[derive(Debug)]
pub struct StationState {
    station_id: String,
    status: Mutex<StationStatus>,
    interval: watch::Sender<Duration>,
    connected: AtomicBool,
}

impl StationState {
    pub fn new(station_id: impl Into<String>, default_interval: Duration) -> Self {
        Self {
            station_id: station_id.into(),
            status: Mutex::new(StationStatus::Available),
            interval: watch::Sender::new(default_interval),
            connected: AtomicBool::new(false),
        }
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn status(&self) -> StationStatus {
        match self.status.lock() {
            Ok(status) => *status,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Busy holds exactly while charging
    pub fn is_busy(&self) -> bool {
        self.status().is_busy()
    }

    pub fn set_status(&self, status: StationStatus) {
        let previous = {
            let mut current = match self.status.lock() {
                Ok(current) => current,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::replace(&mut *current, status)
        };
        if previous != status {
            info!(station = %self.station_id, "Status {} -> {}", previous, status);
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        *self.interval.borrow()
    }

    pub fn subscribe_interval(&self) -> watch::Receiver<Duration> {
        self.interval.subscribe()
    }

    /// Adopt a server-negotiated interval in seconds; zero is ignored
    pub fn adopt_interval(&self, seconds: u64) -> bool {
        if seconds == 0 {
            return false;
        }
        let interval = Duration::from_secs(seconds);
        self.interval.send_replace(interval);
        info!(station = %self.station_id, "Heartbeat interval set to {}s", seconds);
        true
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}
