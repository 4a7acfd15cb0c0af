//! Server configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio_rustls::TlsAcceptor;

use crate::error::{ServerError, ServerResult};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on, `host:port`.
    pub bind_address: String,

    /// PEM certificate chain presented to clients.
    pub cert_path: PathBuf,

    /// PEM private key matching `cert_path`.
    pub key_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:443".to_string(),
            cert_path: PathBuf::from("certificates/cert.crt"),
            key_path: PathBuf::from("certificates/cert.key"),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration listening on `bind_address`.
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            ..Default::default()
        }
    }

    /// Loads a TOML configuration file.
    pub fn load_from(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ServerError::config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Builder: set certificate chain path.
    pub fn with_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_path = path.into();
        self
    }

    /// Builder: set private key path.
    pub fn with_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = path.into();
        self
    }

    /// Loads the key pair and builds the TLS acceptor.
    pub fn acceptor(&self) -> ServerResult<TlsAcceptor> {
        Ok(tlschat_core::acceptor_from_pem_files(
            &self.cert_path,
            &self.key_path,
        )?)
    }
}
