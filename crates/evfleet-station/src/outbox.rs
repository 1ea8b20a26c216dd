//! Handle for queueing outbound calls on the current session

use crate::error::{StationError, StationResult};
use crate::pending::PendingRequests;
use evfleet_types::{Action, CallFrame};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Cloneable sender of `CALL` frames.
///
/// Every call is recorded in the pending table before it is queued for the
/// session writer. Once the session ends the queue is closed and calls fail
/// with [`StationError::NotConnected`].
#[derive(Debug, Clone)]
pub struct Outbox {
    station_id: String,
    tx: mpsc::Sender<CallFrame>,
    pending: Arc<PendingRequests>,
}

impl Outbox {
    pub fn new(
        station_id: impl Into<String>,
        tx: mpsc::Sender<CallFrame>,
        pending: Arc<PendingRequests>,
    ) -> Self {
        Self {
            station_id: station_id.into(),
            tx,
            pending,
        }
    }

    /// Queue a call and return its correlation id
    pub async fn call<T>(&self, action: Action, payload: &T) -> StationResult<String>
    where
        T: Serialize,
    {
        let frame = CallFrame::new(action.clone(), payload)?;
        let unique_id = frame.unique_id.clone();
        self.pending.insert(unique_id.clone(), action.clone(), Instant::now());

        if self.tx.send(frame).await.is_err() {
            self.pending.resolve(&unique_id);
            return Err(StationError::not_connected(&self.station_id));
        }

        debug!(station = %self.station_id, "Queued {} ({})", action, unique_id);
        Ok(unique_id)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_records_pending_entry() {
        let (tx, mut rx) = mpsc::channel(4);
        let pending = Arc::new(PendingRequests::new());
        let outbox = Outbox::new("EVC_1", tx, pending.clone());

        let id = outbox.call(Action::Heartbeat, &json!({})).await.unwrap();
        let frame = rx.recv().await.unwrap();

        assert_eq!(frame.unique_id, id);
        assert_eq!(frame.action, Action::Heartbeat);
        assert_eq!(pending.resolve(&id).unwrap().action, Action::Heartbeat);
    }

    #[tokio::test]
    async fn test_call_after_session_closed() {
        let (tx, rx) = mpsc::channel(4);
        let pending = Arc::new(PendingRequests::new());
        let outbox = Outbox::new("EVC_1", tx, pending.clone());
        drop(rx);

        let err = outbox.call(Action::Heartbeat, &json!({})).await.unwrap_err();
        assert!(matches!(err, StationError::NotConnected { .. }));
        assert!(pending.is_empty());
        assert!(outbox.is_closed());
    }
}
