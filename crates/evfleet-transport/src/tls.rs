//! TLS setup for both ends of the connection

use crate::error::{TransportError, TransportResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Client-side TLS options.
///
/// Stations talk to a central system presenting a self-signed certificate,
/// so certificate and hostname verification are off unless asked for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientTls {
    pub accept_invalid_certs: bool,
}

impl Default for ClientTls {
    fn default() -> Self {
        Self {
            accept_invalid_certs: true,
        }
    }
}

impl ClientTls {
    /// Verify the server certificate chain and hostname
    pub fn verified() -> Self {
        Self {
            accept_invalid_certs: false,
        }
    }

    /// Build a native-tls connector for `wss://` URLs
    pub fn connector(&self) -> TransportResult<native_tls::TlsConnector> {
        if self.accept_invalid_certs {
            warn!("TLS certificate verification disabled for station connections");
        }
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .danger_accept_invalid_hostnames(self.accept_invalid_certs)
            .build()?;
        Ok(connector)
    }
}

/// Server-side TLS identity: PEM certificate chain plus PKCS#8 private key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerTls {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl ServerTls {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Load the identity and build an acceptor
    pub fn acceptor(&self) -> TransportResult<tokio_native_tls::TlsAcceptor> {
        let cert = std::fs::read(&self.cert_path).map_err(|e| {
            TransportError::tls(format!(
                "cannot read certificate {}: {}",
                self.cert_path.display(),
                e
            ))
        })?;
        let key = std::fs::read(&self.key_path).map_err(|e| {
            TransportError::tls(format!(
                "cannot read private key {}: {}",
                self.key_path.display(),
                e
            ))
        })?;

        let identity = native_tls::Identity::from_pkcs8(&cert, &key)?;
        let acceptor = native_tls::TlsAcceptor::new(identity)?;
        info!("Loaded TLS identity from {}", self.cert_path.display());
        Ok(tokio_native_tls::TlsAcceptor::from(acceptor))
    }
}
