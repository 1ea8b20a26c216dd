//! Configuration for the evfleet central system

use crate::error::{ServerError, ServerResult};
use evfleet_transport::{ServerTls, TransportConfig};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Central system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind on
    pub bind_address: String,
    /// WebSocket port
    pub ws_port: u16,
    /// Certificate (PEM); TLS is enabled when both cert and key are set
    pub tls_cert: Option<PathBuf>,
    /// Private key (PKCS#8 PEM)
    pub tls_key: Option<PathBuf>,
    /// Base URL of the relay sink
    pub relay_base_url: String,
    /// Per-request relay timeout in seconds
    pub relay_timeout_secs: u64,
    /// Number of relay workers
    pub relay_workers: usize,
    /// Events buffered for the relay before new ones are dropped
    pub relay_queue_depth: usize,
    /// Largest accepted frame in bytes
    pub max_message_size: usize,
    /// Port for the Prometheus endpoint, disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            ws_port: 8080,
            tls_cert: None,
            tls_key: None,
            relay_base_url: "http://localhost:3000".to_string(),
            relay_timeout_secs: 5,
            relay_workers: 4,
            relay_queue_depth: 1024,
            max_message_size: 65536,
            metrics_port: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ServerError::configuration(format!("{}: {}", path.display(), e)))
    }

    /// Apply `EVFLEET_BIND_ADDRESS`, `EVFLEET_WS_PORT`, `EVFLEET_METRICS_PORT`
    /// and `REST_API_BASE` overrides
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("EVFLEET_BIND_ADDRESS") {
            self.bind_address = addr;
        }
        if let Ok(port) = std::env::var("EVFLEET_WS_PORT") {
            if let Ok(port) = port.parse() {
                self.ws_port = port;
            }
        }
        if let Ok(port) = std::env::var("EVFLEET_METRICS_PORT") {
            if let Ok(port) = port.parse() {
                self.metrics_port = Some(port);
            }
        }
        if let Ok(base) = std::env::var("REST_API_BASE") {
            self.relay_base_url = base;
        }
    }

    /// Defaults with environment overrides applied
    pub fn load_from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bind_address.is_empty() {
            return Err("Bind address cannot be empty".to_string());
        }
        if self.relay_base_url.is_empty() {
            return Err("Relay base URL cannot be empty".to_string());
        }
        if self.relay_timeout_secs == 0 {
            return Err("Relay timeout cannot be 0".to_string());
        }
        if self.relay_workers == 0 {
            return Err("At least one relay worker is required".to_string());
        }
        if self.relay_queue_depth == 0 {
            return Err("Relay queue depth cannot be 0".to_string());
        }
        if self.max_message_size == 0 {
            return Err("Max message size cannot be 0".to_string());
        }
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err("TLS needs both a certificate and a key".to_string());
        }
        Ok(())
    }

    pub fn ws_addr(&self) -> ServerResult<SocketAddr> {
        socket_addr(&self.bind_address, self.ws_port)
    }

    pub fn metrics_addr(&self) -> ServerResult<Option<SocketAddr>> {
        self.metrics_port
            .map(|port| socket_addr(&self.bind_address, port))
            .transpose()
    }

    pub fn tls(&self) -> Option<ServerTls> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Some(ServerTls::new(cert, key)),
            _ => None,
        }
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout_secs)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            max_message_size: self.max_message_size,
            ..TransportConfig::default()
        }
    }
}

fn socket_addr(host: &str, port: u16) -> ServerResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| ServerError::configuration(format!("invalid address {}:{}: {}", host, port, e)))?
        .next()
        .ok_or_else(|| ServerError::configuration(format!("{}:{} resolves to nothing", host, port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.ws_port, 8080);
        assert_eq!(config.relay_base_url, "http://localhost:3000");
        assert_eq!(config.relay_timeout(), Duration::from_secs(5));
        assert!(config.tls().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = ServerConfig {
            relay_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            tls_cert: Some(PathBuf::from("cert.pem")),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            tls_cert: Some(PathBuf::from("cert.pem")),
            tls_key: Some(PathBuf::from("key.pem")),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.tls().is_some());
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "ws_port = 9000").unwrap();
        writeln!(file, "relay_base_url = \"http://sink:3000\"").unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ws_port, 9000);
        assert_eq!(config.relay_base_url, "http://sink:3000");
        assert_eq!(config.relay_workers, 4);
    }

    #[test]
    fn test_socket_addresses() {
        let config = ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            metrics_port: Some(9100),
            ..Default::default()
        };
        assert_eq!(config.ws_addr().unwrap().port(), 8080);
        assert_eq!(config.metrics_addr().unwrap().unwrap().port(), 9100);
        assert!(ServerConfig::default().metrics_addr().unwrap().is_none());
    }
}
