//! tlschat CLI entry point.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use tlschat_client::cli::Cli;
use tlschat_client::config::ClientConfig;
use tlschat_client::error::{ClientError, ClientResult};
use tlschat_client::ChatClient;
use tlschat_core::{TracingConfig, connector_from_pem_file, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::chat_client()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path).map_err(ClientError::Config)?,
        None => ClientConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring config file");
            ClientConfig::default()
        }),
    };
    let config = cli.apply(config);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let name = match config.name.clone() {
        Some(name) => name,
        None => prompt_name(&mut stdin).await?,
    };

    let connector = connector_from_pem_file(&config.ca_path)?;
    let client = ChatClient::new(config.client_options(name));

    client.on_start(|address| println!("Connected to {}", address));
    client.on_stop(|| println!("Client stopped"));
    client.on_text(|text| println!("{}", text));
    client.on_error(|err| warn!(error = %err, "OnError"));

    client.start(&config.server_address, connector).await?;

    match cli.demo {
        Some(count) => {
            for i in 0..count {
                client.text(format!("ms {}", i)).await?;
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
        None => {
            while let Some(line) = stdin.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                client.text(line).await?;
            }
        }
    }

    match client.stop().await {
        // The server may already have closed the connection.
        Ok(()) | Err(ClientError::NotRunning) => Ok(()),
        Err(e) => Err(e),
    }
}

async fn prompt_name<R>(lines: &mut tokio::io::Lines<R>) -> ClientResult<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"Type in name: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            return Err(ClientError::Config("no display name given".into()));
        };
        let name = line.trim();
        if !name.is_empty() {
            return Ok(name.to_string());
        }
    }
}
