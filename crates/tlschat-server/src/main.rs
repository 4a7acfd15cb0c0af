//! tlschat server entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{Level, error, info, warn};

use tlschat_core::{TracingConfig, TracingOutputFormat, init_tracing};
use tlschat_server::{ChatServer, ServerConfig, ServerResult};

/// tlschat-server - broadcast chat over TLS
#[derive(Debug, Parser)]
#[command(name = "tlschat-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short, env = "TLSCHAT_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the configuration file)
    #[arg(long, short, env = "TLSCHAT_ADDRESS")]
    address: Option<String>,

    /// PEM certificate chain
    #[arg(long, env = "TLSCHAT_CERT")]
    cert: Option<PathBuf>,

    /// PEM private key
    #[arg(long, env = "TLSCHAT_KEY")]
    key: Option<PathBuf>,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    pretty: bool,

    /// Enable debug output
    #[arg(long, short = 'v')]
    debug: bool,
}

impl Cli {
    fn server_config(&self) -> ServerResult<ServerConfig> {
        let mut config = match self.config {
            Some(ref path) => ServerConfig::load_from(path)?,
            None => ServerConfig::default(),
        };
        if let Some(ref address) = self.address {
            config.bind_address = address.clone();
        }
        if let Some(ref cert) = self.cert {
            config.cert_path = cert.clone();
        }
        if let Some(ref key) = self.key {
            config.key_path = key.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing_config = TracingConfig::daemon();
    if cli.pretty {
        tracing_config = tracing_config.with_format(TracingOutputFormat::Pretty);
    }
    if cli.debug {
        tracing_config = tracing_config.with_level(Level::DEBUG);
    }
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ServerResult<()> {
    let config = cli.server_config()?;
    let acceptor = config.acceptor()?;

    let server = ChatServer::new();
    server.on_start(|| info!("OnStart"));
    server.on_stop(|| info!("OnStop"));
    server.on_new_connection(|address| info!(%address, "OnNewConnection"));
    server.on_message(|message| info!(%message, "OnMessage"));
    server.on_error(|err| warn!(error = %err, class = ?err.class(), "OnError"));

    server.start(&config.bind_address, acceptor).await?;

    shutdown_signal().await?;
    server.stop().await
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received");
    Ok(())
}
