//! # Station Configuration
//!
//! Settings for one simulated charge point and for a fleet of them. Files
//! may be TOML or JSON, picked by extension.

use crate::error::{StationError, StationResult};
use evfleet_transport::{utils, ClientTls};
use evfleet_types::v16j::BootNotificationRequest;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Identity reported in BootNotification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorInfo {
    pub vendor: String,
    pub model: String,
    pub charge_point_serial_number: Option<String>,
    pub charge_box_serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
    pub meter_type: Option<String>,
    pub meter_serial_number: Option<String>,
}

impl Default for VendorInfo {
    fn default() -> Self {
        Self {
            vendor: "MyVendor".to_string(),
            model: "MyModel".to_string(),
            charge_point_serial_number: Some("1234567890".to_string()),
            charge_box_serial_number: Some("9876543210".to_string()),
            firmware_version: Some("1.0.0".to_string()),
            iccid: Some("89012345678901234".to_string()),
            imsi: Some("123456789012345".to_string()),
            meter_type: Some("MyMeterType".to_string()),
            meter_serial_number: Some("1234567890".to_string()),
        }
    }
}

/// Configuration of a single station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Station identifier, appended to the server URL path
    pub station_id: String,
    /// Central system WebSocket base URL
    pub server_url: String,
    /// Heartbeat interval in seconds until the server negotiates one
    pub heartbeat_interval_secs: u64,
    /// Wait between connection attempts, in seconds
    pub reconnect_delay_secs: u64,
    /// Age in seconds after which an unanswered call is dropped
    pub request_timeout_secs: u64,
    /// Base URL of the service handing out operator commands
    pub command_api_url: String,
    /// Pause between command polls, in milliseconds
    pub command_poll_interval_ms: u64,
    /// HTTP timeout of one command poll, in seconds
    pub command_poll_timeout_secs: u64,
    pub tls: ClientTls,
    pub vendor: VendorInfo,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station_id: "EVC_1".to_string(),
            server_url: "wss://localhost:8080".to_string(),
            heartbeat_interval_secs: evfleet_types::DEFAULT_HEARTBEAT_INTERVAL_SECS,
            reconnect_delay_secs: 5,
            request_timeout_secs: 30,
            command_api_url: "http://localhost:3000".to_string(),
            command_poll_interval_ms: 1500,
            command_poll_timeout_secs: 5,
            tls: ClientTls::default(),
            vendor: VendorInfo::default(),
        }
    }
}

impl StationConfig {
    /// Config for `station_id` with every other setting defaulted
    pub fn for_station(station_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            ..Default::default()
        }
    }

    /// Full URL this station connects to
    pub fn url(&self) -> String {
        utils::station_url(&self.server_url, &self.station_id)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn command_poll_interval(&self) -> Duration {
        Duration::from_millis(self.command_poll_interval_ms)
    }

    pub fn command_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.command_poll_timeout_secs)
    }

    /// BootNotification payload announcing this station
    pub fn boot_request(&self) -> BootNotificationRequest {
        let vendor = &self.vendor;
        BootNotificationRequest {
            cp_id: Some(self.station_id.clone()),
            charge_point_vendor: vendor.vendor.clone(),
            charge_point_model: vendor.model.clone(),
            charge_point_serial_number: vendor.charge_point_serial_number.clone(),
            charge_box_serial_number: vendor.charge_box_serial_number.clone(),
            firmware_version: vendor.firmware_version.clone(),
            iccid: vendor.iccid.clone(),
            imsi: vendor.imsi.clone(),
            meter_type: vendor.meter_type.clone(),
            meter_serial_number: vendor.meter_serial_number.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.station_id.trim().is_empty() {
            return Err("Station ID cannot be empty".to_string());
        }

        if self.station_id.contains('/') {
            return Err("Station ID cannot contain '/'".to_string());
        }

        if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            return Err("Server URL must be a valid WebSocket URL".to_string());
        }

        if self.heartbeat_interval_secs == 0 {
            return Err("Heartbeat interval must be greater than 0".to_string());
        }

        if self.reconnect_delay_secs == 0 {
            return Err("Reconnect delay must be greater than 0".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }

        if !self.command_api_url.starts_with("http://")
            && !self.command_api_url.starts_with("https://")
        {
            return Err("Command API URL must be an HTTP URL".to_string());
        }

        if self.command_poll_interval_ms == 0 {
            return Err("Command poll interval must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// A fleet of stations sharing one template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub station_ids: Vec<String>,
    /// Settings applied to every station; its `station_id` is ignored
    pub station: StationConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            station_ids: vec![
                "EVC_1".to_string(),
                "EVC_2".to_string(),
                "EVC_3".to_string(),
            ],
            station: StationConfig::default(),
        }
    }
}

impl FleetConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> StationResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StationError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        match extension(path) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| StationError::configuration(format!("invalid TOML: {}", e))),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| StationError::configuration(format!("invalid JSON: {}", e))),
            _ => Err(StationError::configuration(
                "Unsupported configuration file format. Use .toml or .json",
            )),
        }
    }

    /// Save configuration to file
    pub fn to_file(&self, path: impl AsRef<Path>) -> StationResult<()> {
        let path = path.as_ref();
        let content = match extension(path) {
            Some("toml") => toml::to_string_pretty(self)
                .map_err(|e| StationError::configuration(e.to_string()))?,
            Some("json") => serde_json::to_string_pretty(self)
                .map_err(|e| StationError::configuration(e.to_string()))?,
            _ => {
                return Err(StationError::configuration(
                    "Unsupported configuration file format. Use .toml or .json",
                ))
            }
        };
        std::fs::write(path, content).map_err(|e| StationError::io(e.to_string()))?;
        Ok(())
    }

    /// One station config per id
    pub fn stations(&self) -> Vec<StationConfig> {
        self.station_ids
            .iter()
            .map(|id| StationConfig {
                station_id: id.clone(),
                ..self.station.clone()
            })
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.station_ids.is_empty() {
            return Err("Fleet must contain at least one station".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for id in &self.station_ids {
            if !seen.insert(id) {
                return Err(format!("Duplicate station ID: {}", id));
            }
        }

        for station in self.stations() {
            station
                .validate()
                .map_err(|e| format!("{}: {}", station.station_id, e))?;
        }

        Ok(())
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}
