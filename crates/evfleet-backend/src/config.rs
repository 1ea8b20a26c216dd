//! Backend configuration

use crate::database::DatabaseConfig;
use crate::error::{BackendError, BackendResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Where station records live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub bind_address: String,
    pub port: u16,
    pub storage: StorageKind,
    pub database: DatabaseConfig,
    /// Liveness sweep period in seconds
    pub monitor_period_secs: u64,
    /// Silence after which an idle station gets a synthesized heartbeat
    pub staleness_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            storage: StorageKind::Sqlite,
            database: DatabaseConfig::default(),
            monitor_period_secs: 10,
            staleness_secs: 60,
        }
    }
}

impl BackendConfig {
    pub fn from_file(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| BackendError::configuration(format!("{}: {}", path.display(), e)))
    }

    /// Apply `EVFLEET_BACKEND_BIND`, `EVFLEET_BACKEND_PORT` and
    /// `DATABASE_URL` overrides
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("EVFLEET_BACKEND_BIND") {
            self.bind_address = addr;
        }
        if let Ok(port) = std::env::var("EVFLEET_BACKEND_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bind_address.is_empty() {
            return Err("Bind address cannot be empty".to_string());
        }
        if self.monitor_period_secs == 0 {
            return Err("Monitor period cannot be 0".to_string());
        }
        if self.staleness_secs == 0 {
            return Err("Staleness threshold cannot be 0".to_string());
        }
        if self.storage == StorageKind::Sqlite && self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn monitor_period(&self) -> Duration {
        Duration::from_secs(self.monitor_period_secs)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BackendConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.monitor_period(), Duration::from_secs(10));
        assert_eq!(config.staleness(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "storage = \"memory\"").unwrap();
        writeln!(file, "staleness_secs = 90").unwrap();
        writeln!(file, "[database]").unwrap();
        writeln!(file, "url = \"sqlite::memory:\"").unwrap();

        let config = BackendConfig::from_file(file.path()).unwrap();
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.staleness_secs, 90);
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_validation() {
        let config = BackendConfig {
            monitor_period_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
