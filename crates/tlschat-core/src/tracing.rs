//! Tracing setup shared by the tlschat binaries.
//!
//! Both the server and the client install a single global subscriber at
//! startup. The server defaults to JSON lines, the client to compact
//! human-readable output that stays out of the way of the chat transcript.
//!
//! ```ignore
//! use tlschat_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::daemon())?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    prelude::*,
};

/// Target prefix matched by the default filter; covers every `tlschat_*` crate.
const TARGET_PREFIX: &str = "tlschat";

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// Failed to set global subscriber
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// Failed to parse env filter directive
    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line human-readable format
    Pretty,
    /// Compact single-line format (default)
    #[default]
    Compact,
    /// JSON lines, one event per line
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogDestination {
    #[default]
    Stdout,
    /// Keeps stdout free for the chat transcript.
    Stderr,
}

impl LogDestination {
    fn make_writer(self) -> BoxMakeWriter {
        match self {
            Self::Stdout => BoxMakeWriter::new(std::io::stdout),
            Self::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level applied to tlschat targets when RUST_LOG is not set
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    pub destination: LogDestination,
    /// Include file/line information
    pub include_location: bool,
    /// Include the module path
    pub include_target: bool,
    pub include_timestamp: bool,
    /// Emit span open/close events
    pub include_span_events: bool,
    /// Explicit filter directive, takes precedence over RUST_LOG and `default_level`
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Compact,
            destination: LogDestination::Stdout,
            include_location: false,
            include_target: false,
            include_timestamp: true,
            include_span_events: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Interactive chat client: warnings only, on stderr.
    #[must_use]
    pub fn chat_client() -> Self {
        Self {
            default_level: Level::WARN,
            destination: LogDestination::Stderr,
            include_timestamp: false,
            ..Self::default()
        }
    }

    /// Chat client with `--debug`: verbose, no timestamps, on stderr.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_location: true,
            include_target: true,
            ..Self::chat_client()
        }
    }

    /// Long-running chat server.
    #[must_use]
    pub fn daemon() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Json,
            destination: LogDestination::Stdout,
            include_location: true,
            include_target: true,
            include_timestamp: true,
            include_span_events: true,
            env_filter: None,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_destination(mut self, destination: LogDestination) -> Self {
        self.destination = destination;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Directive used when neither `env_filter` nor RUST_LOG is set.
    pub fn default_directive(&self) -> String {
        format!("{}={}", TARGET_PREFIX, self.default_level)
    }
}

/// Installs the global subscriber described by `config`.
///
/// # Errors
///
/// Fails if a global subscriber is already installed or if the explicit
/// filter directive does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = match config.env_filter {
        Some(ref filter) => EnvFilter::try_new(filter)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.default_directive())),
    };

    let span_events = if config.include_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(config.destination.make_writer())
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target)
        .with_span_events(span_events);

    let layer = match (config.output_format, config.include_timestamp) {
        (TracingOutputFormat::Json, _) => base.json().boxed(),
        (TracingOutputFormat::Pretty, true) => base.pretty().boxed(),
        (TracingOutputFormat::Pretty, false) => base.pretty().without_time().boxed(),
        (TracingOutputFormat::Compact, true) => base.compact().boxed(),
        (TracingOutputFormat::Compact, false) => base.compact().without_time().boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
