//! # Station Engine
//!
//! Keeps one station present on the central system: connect, run a
//! session, back off, retry. Retries never give up; only cancellation stops
//! the engine.

use crate::commands::{CommandSource, HttpCommandSource};
use crate::config::{FleetConfig, StationConfig};
use crate::error::{StationError, StationResult};
use crate::session::Session;
use crate::state::StationState;
use evfleet_transport::TransportConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Supervises the connection of a single station
pub struct StationEngine {
    config: StationConfig,
    transport: TransportConfig,
    state: Arc<StationState>,
    commands: Arc<dyn CommandSource>,
}

impl StationEngine {
    /// Create an engine polling commands over HTTP
    pub fn new(config: StationConfig) -> StationResult<Self> {
        config.validate().map_err(StationError::configuration)?;
        let commands =
            HttpCommandSource::new(config.command_api_url.clone(), config.command_poll_timeout())?;
        Ok(Self::with_command_source(config, Arc::new(commands)))
    }

    /// Create an engine with a custom command source
    pub fn with_command_source(config: StationConfig, commands: Arc<dyn CommandSource>) -> Self {
        let state = Arc::new(StationState::new(
            config.station_id.clone(),
            config.heartbeat_interval(),
        ));
        Self {
            config,
            transport: TransportConfig::default(),
            state,
            commands,
        }
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn station_id(&self) -> &str {
        &self.config.station_id
    }

    pub fn state(&self) -> Arc<StationState> {
        self.state.clone()
    }

    /// Run until `cancel` fires, reconnecting after every failure
    pub async fn start(&self, cancel: CancellationToken) {
        let station_id = self.station_id().to_string();
        let url = self.config.url();
        info!(station = %station_id, "Station engine started for {}", url);

        while !cancel.is_cancelled() {
            match self.connect_once(&url, &cancel).await {
                Ok(()) => info!(station = %station_id, "Session closed"),
                Err(e) => warn!(station = %station_id, "Connection error: {}", e),
            }
            self.state.set_connected(false);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {
                    info!(station = %station_id, "Reconnecting to {}", url);
                }
            }
        }

        info!(station = %station_id, "Station engine stopped");
    }

    async fn connect_once(&self, url: &str, cancel: &CancellationToken) -> StationResult<()> {
        let socket = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            socket = evfleet_transport::connect(url, &self.transport, &self.config.tls) => socket?,
        };
        info!(station = %self.station_id(), "Connected");

        let session = Session::new(
            self.config.clone(),
            self.transport.clone(),
            self.state.clone(),
            self.commands.clone(),
        );
        session.run(socket, cancel.clone()).await
    }
}

/// A set of engines run and joined together
pub struct Fleet {
    engines: Vec<Arc<StationEngine>>,
    tracker: TaskTracker,
}

impl Fleet {
    pub fn new(engines: Vec<StationEngine>) -> Self {
        Self {
            engines: engines.into_iter().map(Arc::new).collect(),
            tracker: TaskTracker::new(),
        }
    }

    /// One HTTP-polling engine per configured station
    pub fn from_config(config: &FleetConfig) -> StationResult<Self> {
        config.validate().map_err(StationError::configuration)?;
        let engines = config
            .stations()
            .into_iter()
            .map(StationEngine::new)
            .collect::<StationResult<Vec<_>>>()?;
        Ok(Self::new(engines))
    }

    pub fn engines(&self) -> &[Arc<StationEngine>] {
        &self.engines
    }

    /// Run every engine until `cancel` fires, then wait for all of them
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Starting fleet of {} stations", self.engines.len());

        for engine in &self.engines {
            let engine = engine.clone();
            let cancel = cancel.clone();
            self.tracker.spawn(async move { engine.start(cancel).await });
        }

        cancel.cancelled().await;
        self.tracker.close();
        self.tracker.wait().await;

        if self.engines.iter().any(|engine| engine.state().is_connected()) {
            error!("Station still marked connected after shutdown");
        }
        info!("Fleet stopped");
    }
}
