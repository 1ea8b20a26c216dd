//! Heartbeat scheduler

use crate::outbox::Outbox;
use crate::state::StationState;
use evfleet_types::{v16j::HeartbeatRequest, Action, StationStatus};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sleep for the current interval, then send a Heartbeat if the station is
/// Available. The interval is re-read every cycle.
///
/// Returns when `cancel` fires or the session stops accepting calls.
pub async fn run_heartbeat(state: Arc<StationState>, outbox: Outbox, cancel: CancellationToken) {
    let mut interval_rx = state.subscribe_interval();

    loop {
        let wait = *interval_rx.borrow_and_update();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        if cancel.is_cancelled() {
            break;
        }

        let status = state.status();
        if status != StationStatus::Available {
            debug!(station = %state.station_id(), "Skipping heartbeat while {}", status);
            continue;
        }

        match outbox.call(Action::Heartbeat, &HeartbeatRequest::default()).await {
            Ok(_) => info!(station = %state.station_id(), "Heartbeat sent"),
            Err(e) => {
                warn!(station = %state.station_id(), "Heartbeat stopped: {}", e);
                break;
            }
        }
    }

    debug!(station = %state.station_id(), "Heartbeat scheduler finished");
}
