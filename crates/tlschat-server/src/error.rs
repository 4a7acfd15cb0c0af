//! Server error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tlschat_protocol::{ErrorClass, MessageType, ProtocolError};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` called while the server is running.
    #[error("Server is already running")]
    AlreadyRunning,

    /// `stop` called while the server is idle.
    #[error("Server is not running")]
    NotRunning,

    /// Binding the listener failed.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Accepting a TCP connection failed.
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// TLS handshake with a freshly accepted peer failed.
    #[error("TLS handshake with {peer} failed: {source}")]
    Handshake {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Reading from a peer failed; its connection is closed.
    #[error("Read from {peer} failed: {source}")]
    Read {
        peer: SocketAddr,
        #[source]
        source: ProtocolError,
    },

    /// Writing a broadcast frame to a peer failed.
    #[error("Write to {peer} failed: {source}")]
    Write {
        peer: SocketAddr,
        #[source]
        source: ProtocolError,
    },

    /// A peer sent a frame that did not decode.
    #[error("Invalid frame from {peer}: {source}")]
    Protocol {
        peer: SocketAddr,
        #[source]
        source: ProtocolError,
    },

    /// A peer sent a message type the server does not handle.
    #[error("Unexpected message type {message_type} from {peer}")]
    UnexpectedMessage {
        peer: SocketAddr,
        message_type: MessageType,
    },

    /// A message could not be encoded for broadcast.
    #[error("Failed to encode broadcast: {0}")]
    Encoding(#[source] ProtocolError),

    /// TLS material could not be loaded.
    #[error("TLS error: {0}")]
    Tls(#[from] tlschat_core::TlsError),

    /// IO error (socket, file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::AlreadyRunning | Self::NotRunning => ErrorClass::Lifecycle,
            Self::Protocol { .. } | Self::UnexpectedMessage { .. } | Self::Encoding(_) => {
                ErrorClass::Protocol
            }
            _ => ErrorClass::Transport,
        }
    }
}
