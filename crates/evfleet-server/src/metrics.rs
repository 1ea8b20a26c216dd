//! Prometheus metrics for the central system

use crate::error::ServerResult;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

const NAMESPACE: &str = "evfleet_server";

/// Counters and gauges exported at `/metrics`
pub struct ServerMetrics {
    registry: Registry,
    frames_received: IntCounter,
    malformed_frames: IntCounter,
    calls: IntCounterVec,
    active_sessions: IntGauge,
    relay_delivered: IntCounter,
    relay_failed: IntCounter,
    relay_dropped: IntCounter,
}

impl ServerMetrics {
    pub fn new() -> ServerResult<Self> {
        let registry = Registry::new();

        let frames_received = IntCounter::new(
            format!("{}_frames_received_total", NAMESPACE),
            "Total number of text frames received from stations",
        )?;
        let malformed_frames = IntCounter::new(
            format!("{}_malformed_frames_total", NAMESPACE),
            "Frames dropped because they could not be parsed",
        )?;
        let calls = IntCounterVec::new(
            Opts::new(
                format!("{}_calls_total", NAMESPACE),
                "CALL frames answered, by action",
            ),
            &["action"],
        )?;
        let active_sessions = IntGauge::new(
            format!("{}_active_sessions", NAMESPACE),
            "Number of registered station sessions",
        )?;
        let relay_delivered = IntCounter::new(
            format!("{}_relay_delivered_total", NAMESPACE),
            "Events accepted by the relay sink",
        )?;
        let relay_failed = IntCounter::new(
            format!("{}_relay_failed_total", NAMESPACE),
            "Events the relay sink rejected or never answered",
        )?;
        let relay_dropped = IntCounter::new(
            format!("{}_relay_dropped_total", NAMESPACE),
            "Events dropped because the relay queue was full",
        )?;

        registry.register(Box::new(frames_received.clone()))?;
        registry.register(Box::new(malformed_frames.clone()))?;
        registry.register(Box::new(calls.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(relay_delivered.clone()))?;
        registry.register(Box::new(relay_failed.clone()))?;
        registry.register(Box::new(relay_dropped.clone()))?;

        Ok(Self {
            registry,
            frames_received,
            malformed_frames,
            calls,
            active_sessions,
            relay_delivered,
            relay_failed,
            relay_dropped,
        })
    }

    pub fn record_frame(&self) {
        self.frames_received.inc();
    }

    pub fn record_malformed(&self) {
        self.malformed_frames.inc();
    }

    pub fn record_call(&self, action: &str) {
        self.calls.with_label_values(&[action]).inc();
    }

    pub fn set_active_sessions(&self, count: usize) {
        self.active_sessions.set(count as i64);
    }

    pub fn record_relay_delivered(&self) {
        self.relay_delivered.inc();
    }

    pub fn record_relay_failed(&self) {
        self.relay_failed.inc();
    }

    pub fn record_relay_dropped(&self) {
        self.relay_dropped.inc();
    }

    pub fn relay_dropped(&self) -> u64 {
        self.relay_dropped.get()
    }

    pub fn relay_delivered(&self) -> u64 {
        self.relay_delivered.get()
    }

    pub fn relay_failed(&self) -> u64 {
        self.relay_failed.get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> ServerResult<String> {
        let encoder = prometheus::TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }
}
