//! Client configuration.
//!
//! Settings live in `~/.config/tlschat/config.toml` by default:
//!
//! ```toml
//! name = "alice"
//! server_address = "chat.example.com:443"
//! ca_path = "/etc/tlschat/ca.crt"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::client::ClientOptions;

/// Configuration for the tlschat client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Display name. Prompted for when unset.
    pub name: Option<String>,

    /// Server address, `host:port`.
    pub server_address: String,

    /// PEM file with the certificate authority trusted for the server.
    pub ca_path: PathBuf,

    /// Name checked against the server certificate, when it differs from
    /// the host in `server_address`.
    pub server_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: None,
            server_address: "127.0.0.1:443".to_string(),
            ca_path: PathBuf::from("certificates/ca.crt"),
            server_name: None,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tlschat")
            .join("config.toml")
    }

    /// Engine options for the given display name.
    pub fn client_options(&self, name: impl Into<String>) -> ClientOptions {
        ClientOptions {
            name: name.into(),
            server_name: self.server_name.clone(),
        }
    }
}
