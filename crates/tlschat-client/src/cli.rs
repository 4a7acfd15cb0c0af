//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

use crate::config::ClientConfig;

/// tlschat - chat over TLS
#[derive(Debug, Parser)]
#[command(name = "tlschat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "TLSCHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Display name (prompted for when neither set here nor in the config)
    #[arg(long, short)]
    pub name: Option<String>,

    /// Server address, host:port
    #[arg(long, short, env = "TLSCHAT_ADDRESS")]
    pub address: Option<String>,

    /// PEM file with the trusted certificate authority
    #[arg(long, env = "TLSCHAT_CA")]
    pub ca: Option<PathBuf>,

    /// Name to verify in the server certificate
    #[arg(long)]
    pub server_name: Option<String>,

    /// Send N numbered messages every 100ms instead of reading stdin
    #[arg(long, value_name = "N")]
    pub demo: Option<usize>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,
}

impl Cli {
    /// Applies command-line overrides on top of a loaded configuration.
    pub fn apply(&self, mut config: ClientConfig) -> ClientConfig {
        if let Some(ref name) = self.name {
            config.name = Some(name.clone());
        }
        if let Some(ref address) = self.address {
            config.server_address = address.clone();
        }
        if let Some(ref ca) = self.ca {
            config.ca_path = ca.clone();
        }
        if let Some(ref server_name) = self.server_name {
            config.server_name = Some(server_name.clone());
        }
        config
    }
}
