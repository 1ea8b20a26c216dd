//! Operator commands: where they come from and how they are applied

use crate::error::{StationError, StationResult};
use crate::outbox::Outbox;
use crate::state::StationState;
use async_trait::async_trait;
use evfleet_types::{v16j::StatusNotificationRequest, Action, StationCommand, StationStatus};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Source of raw operator commands for a station
#[async_trait]
pub trait CommandSource: Send + Sync {
    /// Next queued command for `station_id`, if any
    async fn next_command(&self, station_id: &str) -> StationResult<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    command: Option<String>,
}

/// Polls `GET {base_url}/next_command/{station_id}`
#[derive(Debug, Clone)]
pub struct HttpCommandSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCommandSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> StationResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, station_id: &str) -> String {
        format!(
            "{}/next_command/{}",
            self.base_url.trim_end_matches('/'),
            station_id
        )
    }
}

#[async_trait]
impl CommandSource for HttpCommandSource {
    async fn next_command(&self, station_id: &str) -> StationResult<Option<String>> {
        let response = self.client.get(self.url(station_id)).send().await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let reply: CommandReply = response.json().await?;
                Ok(reply.command.filter(|command| !command.trim().is_empty()))
            }
            status => Err(StationError::command_source(format!(
                "command poll answered {}",
                status
            ))),
        }
    }
}

/// Apply a raw command: send a StatusNotification for the mapped status and
/// record it locally.
///
/// Unrecognised commands change nothing and send nothing; they yield
/// `Ok(None)`.
pub async fn apply_command(
    state: &StationState,
    outbox: &Outbox,
    raw: &str,
) -> StationResult<Option<StationStatus>> {
    let Some(command) = StationCommand::parse(raw) else {
        debug!(station = %state.station_id(), "Ignoring unknown command {:?}", raw);
        return Ok(None);
    };

    let status = command.target_status();
    let request =
        StatusNotificationRequest::station_wide(state.station_id(), status, chrono::Utc::now());
    outbox.call(Action::StatusNotification, &request).await?;
    state.set_status(status);

    info!(station = %state.station_id(), "Applied command {} -> {}", command, status);
    Ok(Some(status))
}

/// Poll `source` until cancelled or the session closes, applying every
/// command received.
pub async fn run_command_poll(
    source: Arc<dyn CommandSource>,
    state: Arc<StationState>,
    outbox: Outbox,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        let polled = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = source.next_command(state.station_id()) => polled,
        };

        match polled {
            Ok(Some(raw)) => {
                if let Err(e) = apply_command(&state, &outbox, &raw).await {
                    warn!(station = %state.station_id(), "Command {:?} not applied: {}", raw, e);
                    if e.ends_session() {
                        break;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!(station = %state.station_id(), "Command poll error: {}", e),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    debug!(station = %state.station_id(), "Command poll finished");
}
