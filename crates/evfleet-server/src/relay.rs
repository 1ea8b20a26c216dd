//! Forwarding of processed events to the relay sink
//!
//! Sessions enqueue events without waiting. A fixed pool of workers, each
//! serving a fixed subset of stations, POSTs every event to the sink; failures are logged and
//! counted, never reported back to a station.

use crate::error::{RelayError, RelayResult};
use crate::metrics::ServerMetrics;
use async_trait::async_trait;
use evfleet_types::Action;
use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// `/bootnotification` body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootRelay {
    pub cp_id: String,
    pub charge_point_vendor: Option<Value>,
    pub charge_point_model: Option<Value>,
    pub charge_point_serial_number: Option<Value>,
    pub charge_box_serial_number: Option<Value>,
    pub firmware_version: Option<Value>,
    pub iccid: Option<Value>,
    pub imsi: Option<Value>,
    pub meter_type: Option<Value>,
    pub meter_serial_number: Option<Value>,
}

/// `/heartbeat` body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRelay {
    pub cp_id: String,
    pub current_time: Option<Value>,
}

/// `/statusnotification` body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRelay {
    pub cp_id: String,
    pub connector_id: Option<Value>,
    pub status: Option<Value>,
    pub error_code: Option<Value>,
    pub info: Option<Value>,
    pub timestamp: Option<Value>,
    pub vendor_id: Option<Value>,
    pub vendor_error_code: Option<Value>,
}

/// One event bound for the relay sink. Serializes to the endpoint body:
/// station id first, absent fields as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RelayEvent {
    Boot(BootRelay),
    Heartbeat(HeartbeatRelay),
    Status(StatusRelay),
}

fn field(payload: &Value, name: &str) -> Option<Value> {
    payload.get(name).cloned()
}

impl RelayEvent {
    /// Build the event for a processed call. Unknown actions are not relayed.
    pub fn from_call(station_id: &str, action: &Action, payload: &Value) -> Option<Self> {
        let cp_id = station_id.to_string();
        let event = match action {
            Action::BootNotification => RelayEvent::Boot(BootRelay {
                cp_id,
                charge_point_vendor: field(payload, "chargePointVendor"),
                charge_point_model: field(payload, "chargePointModel"),
                charge_point_serial_number: field(payload, "chargePointSerialNumber"),
                charge_box_serial_number: field(payload, "chargeBoxSerialNumber"),
                firmware_version: field(payload, "firmwareVersion"),
                iccid: field(payload, "iccid"),
                imsi: field(payload, "imsi"),
                meter_type: field(payload, "meterType"),
                meter_serial_number: field(payload, "meterSerialNumber"),
            }),
            Action::Heartbeat => RelayEvent::Heartbeat(HeartbeatRelay {
                cp_id,
                current_time: field(payload, "currentTime"),
            }),
            Action::StatusNotification => RelayEvent::Status(StatusRelay {
                cp_id,
                connector_id: field(payload, "connectorId"),
                status: field(payload, "status"),
                error_code: field(payload, "errorCode"),
                info: field(payload, "info"),
                timestamp: field(payload, "timestamp"),
                vendor_id: field(payload, "vendorId"),
                vendor_error_code: field(payload, "vendorErrorCode"),
            }),
            Action::Unknown(_) => return None,
        };
        Some(event)
    }

    /// Sink endpoint path
    pub fn endpoint(&self) -> &'static str {
        match self {
            RelayEvent::Boot(_) => "/bootnotification",
            RelayEvent::Heartbeat(_) => "/heartbeat",
            RelayEvent::Status(_) => "/statusnotification",
        }
    }

    pub fn station_id(&self) -> &str {
        match self {
            RelayEvent::Boot(body) => &body.cp_id,
            RelayEvent::Heartbeat(body) => &body.cp_id,
            RelayEvent::Status(body) => &body.cp_id,
        }
    }
}

/// Destination for relay events
#[async_trait]
pub trait RelaySink: Send + Sync {
    async fn deliver(&self, event: &RelayEvent) -> RelayResult<()>;
}

/// Sink reached over HTTP
pub struct HttpRelay {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRelay {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RelayResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn url_for(&self, event: &RelayEvent) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), event.endpoint())
    }
}

#[async_trait]
impl RelaySink for HttpRelay {
    async fn deliver(&self, event: &RelayEvent) -> RelayResult<()> {
        let url = self.url_for(event);
        debug!("[REST] -> {} {}", event.endpoint(), event.station_id());

        let response = self.client.post(&url).json(event).send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Status {
                endpoint: event.endpoint().to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Bounded hand-off from sessions to relay workers.
///
/// Each worker owns its own queue and a station always lands on the same
/// worker, so one station's events reach the sink in the order they were
/// enqueued.
#[derive(Clone)]
pub struct RelayQueue {
    shards: Arc<[mpsc::Sender<RelayEvent>]>,
    metrics: Arc<ServerMetrics>,
}

impl RelayQueue {
    /// Start `workers` tasks on `tracker`, splitting a total of `depth`
    /// queued events between them. Workers exit once every queue handle is
    /// dropped and their backlog is delivered.
    pub fn start(
        sink: Arc<dyn RelaySink>,
        workers: usize,
        depth: usize,
        metrics: Arc<ServerMetrics>,
        tracker: &TaskTracker,
    ) -> Self {
        let workers = workers.max(1);
        let shard_depth = depth.div_ceil(workers).max(1);

        let mut shards = Vec::with_capacity(workers);
        for worker in 0..workers {
            let (tx, rx) = mpsc::channel(shard_depth);
            tracker.spawn(relay_worker(worker, rx, sink.clone(), metrics.clone()));
            shards.push(tx);
        }
        info!(
            "Relay started with {} workers, {} queued events each",
            workers, shard_depth
        );

        Self {
            shards: shards.into(),
            metrics,
        }
    }

    fn shard_for(&self, station_id: &str) -> &mpsc::Sender<RelayEvent> {
        let mut hasher = DefaultHasher::new();
        station_id.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    /// Queue an event without waiting. Returns false if it was dropped.
    pub fn enqueue(&self, event: RelayEvent) -> bool {
        match self.shard_for(event.station_id()).try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.metrics.record_relay_dropped();
                warn!(
                    "Relay queue full, dropping {} from {}",
                    event.endpoint(),
                    event.station_id()
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.metrics.record_relay_dropped();
                warn!(
                    "Relay stopped, dropping {} from {}",
                    event.endpoint(),
                    event.station_id()
                );
                false
            }
        }
    }
}

async fn relay_worker(
    worker: usize,
    mut rx: mpsc::Receiver<RelayEvent>,
    sink: Arc<dyn RelaySink>,
    metrics: Arc<ServerMetrics>,
) {
    while let Some(event) = rx.recv().await {
        match sink.deliver(&event).await {
            Ok(()) => {
                metrics.record_relay_delivered();
                debug!("[REST] OK {} for {}", event.endpoint(), event.station_id());
            }
            Err(e) => {
                metrics.record_relay_failed();
                error!("[REST] {} for {} failed: {}", event.endpoint(), event.station_id(), e);
            }
        }
    }
    debug!("Relay worker {} stopped", worker);
}
