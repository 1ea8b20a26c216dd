//! One connected session of a station

use crate::commands::{run_command_poll, CommandSource};
use crate::config::StationConfig;
use crate::error::StationResult;
use crate::heartbeat::run_heartbeat;
use crate::outbox::Outbox;
use crate::pending::PendingRequests;
use crate::state::StationState;
use evfleet_transport::{
    classify, text_message, ClientSocket, Inbound, TransportConfig, TransportError,
};
use evfleet_types::{v16j::StatusNotificationRequest, Action, CallFrame, CallResultFrame, Frame};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// What an inbound frame did to the station
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// A result resolved a pending call
    Resolved { action: Action },
    /// A boot result set a new heartbeat interval
    IntervalAdopted { seconds: u64 },
    /// A result with no matching pending call
    Unmatched,
    /// A server-initiated call, which stations do not serve
    IgnoredCall { action: Action },
    /// The frame could not be parsed
    Malformed,
}

/// Drives the protocol on one connected socket
pub struct Session {
    config: StationConfig,
    transport: TransportConfig,
    state: Arc<StationState>,
    commands: Arc<dyn CommandSource>,
    pending: Arc<PendingRequests>,
}

impl Session {
    pub fn new(
        config: StationConfig,
        transport: TransportConfig,
        state: Arc<StationState>,
        commands: Arc<dyn CommandSource>,
    ) -> Self {
        Self {
            config,
            transport,
            state,
            commands,
            pending: Arc::new(PendingRequests::new()),
        }
    }

    /// Run until the socket fails or `cancel` fires.
    ///
    /// Announces boot and current status, then reads frames while heartbeat
    /// and command polling run as background tasks. Every task started here
    /// is joined before returning.
    pub async fn run(&self, socket: ClientSocket, cancel: CancellationToken) -> StationResult<()> {
        let station_id = self.config.station_id.clone();
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::channel::<CallFrame>(OUTBOUND_QUEUE_DEPTH);
        let outbox = Outbox::new(station_id.clone(), tx, self.pending.clone());

        self.state.set_connected(true);
        let session_cancel = cancel.child_token();
        let tracker = TaskTracker::new();

        let outcome = async {
            outbox
                .call(Action::BootNotification, &self.config.boot_request())
                .await?;
            info!(station = %station_id, "BootNotification sent");

            let status = self.state.status();
            let notification =
                StatusNotificationRequest::station_wide(&station_id, status, chrono::Utc::now());
            outbox.call(Action::StatusNotification, &notification).await?;
            info!(station = %station_id, "StatusNotification: {}", status);

            tracker.spawn(run_heartbeat(
                self.state.clone(),
                outbox.clone(),
                session_cancel.clone(),
            ));
            tracker.spawn(run_command_poll(
                self.commands.clone(),
                self.state.clone(),
                outbox.clone(),
                self.config.command_poll_interval(),
                session_cancel.clone(),
            ));

            tokio::select! {
                _ = session_cancel.cancelled() => Ok(()),
                result = self.read_loop(&mut stream) => result,
                result = write_loop(&mut sink, &mut rx) => result,
                _ = evict_loop(&self.pending, &station_id, self.config.request_timeout()) => Ok(()),
            }
        }
        .await;

        self.state.set_connected(false);
        session_cancel.cancel();
        rx.close();
        tracker.close();
        tracker.wait().await;
        self.pending.clear();

        if let Err(e) = sink.close().await {
            debug!(station = %station_id, "Close after session end failed: {}", e);
        }
        info!(station = %station_id, "Session ended");
        outcome
    }

    async fn read_loop(&self, stream: &mut SplitStream<ClientSocket>) -> StationResult<()> {
        while let Some(message) = stream.next().await {
            let message = message.map_err(TransportError::from)?;
            if let Inbound::Text(text) = classify(message, &self.transport)? {
                self.handle_text(&text);
            }
        }
        Err(TransportError::closed("stream ended").into())
    }

    /// Interpret one inbound text frame. Never fails: bad frames are logged
    /// and dropped.
    pub fn handle_text(&self, text: &str) -> InboundOutcome {
        let station_id = self.state.station_id();
        match Frame::parse(text) {
            Err(e) => {
                warn!(station = %station_id, "Dropping frame: {}", e);
                InboundOutcome::Malformed
            }
            Ok(Frame::Call(call)) => {
                warn!(station = %station_id, "Ignoring server call {} ({})", call.action, call.unique_id);
                InboundOutcome::IgnoredCall {
                    action: call.action,
                }
            }
            Ok(Frame::CallResult(result)) => self.handle_result(result),
        }
    }

    fn handle_result(&self, result: CallResultFrame) -> InboundOutcome {
        let station_id = self.state.station_id();
        let Some(call) = self.pending.resolve(&result.unique_id) else {
            debug!(station = %station_id, "Result {} matches no pending call", result.unique_id);
            return InboundOutcome::Unmatched;
        };

        info!(station = %station_id, "Response to {}: {}", call.action, result.payload);

        if call.action == Action::BootNotification {
            if let Some(status) = result.payload.get("status").and_then(|s| s.as_str()) {
                debug!(station = %station_id, "Registration status {}", status);
            }
            let interval = result
                .payload
                .get("interval")
                .and_then(|i| i.as_u64())
                .unwrap_or_default();
            if self.state.adopt_interval(interval) {
                return InboundOutcome::IntervalAdopted { seconds: interval };
            }
        }

        InboundOutcome::Resolved {
            action: call.action,
        }
    }
}

async fn write_loop(
    sink: &mut SplitSink<ClientSocket, Message>,
    rx: &mut mpsc::Receiver<CallFrame>,
) -> StationResult<()> {
    while let Some(call) = rx.recv().await {
        let text = Frame::from(call).to_text();
        sink.send(text_message(text))
            .await
            .map_err(TransportError::from)?;
    }
    Err(TransportError::closed("outbound queue closed").into())
}

async fn evict_loop(pending: &PendingRequests, station_id: &str, timeout: Duration) {
    let period = (timeout / 2).max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        for (unique_id, call) in pending.evict_expired(Instant::now(), timeout) {
            warn!(
                station = %station_id,
                "No result for {} ({}) after {:?}, dropping",
                call.action, unique_id, timeout
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StationResult;
    use async_trait::async_trait;

    struct NoCommands;

    #[async_trait]
    impl CommandSource for NoCommands {
        async fn next_command(&self, _station_id: &str) -> StationResult<Option<String>> {
            Ok(None)
        }
    }

    fn session() -> Session {
        let config = StationConfig::for_station("EVC_1");
        let state = Arc::new(StationState::new("EVC_1", config.heartbeat_interval()));
        Session::new(config, TransportConfig::default(), state, Arc::new(NoCommands))
    }

    #[test]
    fn test_boot_result_adopts_interval() {
        let session = session();
        session
            .pending
            .insert("boot-1", Action::BootNotification, Instant::now());

        let outcome = session.handle_text(
            r#"[3,"boot-1",{"status":"Accepted","currentTime":"2024-01-01T00:00:00Z","interval":45}]"#,
        );

        assert_eq!(outcome, InboundOutcome::IntervalAdopted { seconds: 45 });
        assert_eq!(session.state.heartbeat_interval(), Duration::from_secs(45));
        assert!(session.pending.is_empty());
    }

    #[test]
    fn test_interval_only_adopted_from_boot_results() {
        let session = session();
        session
            .pending
            .insert("hb-1", Action::Heartbeat, Instant::now());

        let outcome = session.handle_text(r#"[3,"hb-1",{"interval":5}]"#);
        assert_eq!(
            outcome,
            InboundOutcome::Resolved {
                action: Action::Heartbeat
            }
        );
        assert_eq!(session.state.heartbeat_interval(), Duration::from_secs(60));

        let outcome = session.handle_text(r#"[3,"unknown-id",{"interval":5}]"#);
        assert_eq!(outcome, InboundOutcome::Unmatched);
        assert_eq!(session.state.heartbeat_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_misspelled_status_field_is_not_special() {
        let session = session();
        session
            .pending
            .insert("boot-2", Action::BootNotification, Instant::now());

        let outcome = session.handle_text(r#"[3,"boot-2",{"statyus":"Accepted"}]"#);
        assert_eq!(
            outcome,
            InboundOutcome::Resolved {
                action: Action::BootNotification
            }
        );
        assert_eq!(session.state.heartbeat_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_bad_frames_are_dropped() {
        let session = session();
        assert_eq!(session.handle_text("[3]"), InboundOutcome::Malformed);
        assert_eq!(session.handle_text("garbage"), InboundOutcome::Malformed);
        assert_eq!(
            session.handle_text(r#"[2,"srv-1","Reset",{}]"#),
            InboundOutcome::IgnoredCall {
                action: Action::Unknown("Reset".to_string())
            }
        );
    }
}
