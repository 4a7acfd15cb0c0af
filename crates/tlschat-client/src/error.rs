//! Client error types.

use std::fmt;

use tlschat_core::TlsError;
use tlschat_protocol::{ErrorClass, MessageType, ProtocolError};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// `start` called while connected.
    AlreadyRunning,
    /// `stop` or `text` called while idle.
    NotRunning,
    /// Configuration error.
    Config(String),
    /// Server address or TLS server name could not be parsed.
    InvalidAddress(String),
    /// Dialing or the TLS handshake failed.
    Connection(String),
    /// Loading trust roots failed.
    Tls(TlsError),
    /// IO error.
    Io(std::io::Error),
    /// Reading, decoding or writing a frame failed.
    Protocol(ProtocolError),
    /// The server sent a message type the client does not handle.
    UnexpectedMessage(MessageType),
}

impl ClientError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::AlreadyRunning | Self::NotRunning => ErrorClass::Lifecycle,
            Self::Protocol(err) => err.class(),
            Self::UnexpectedMessage(_) => ErrorClass::Protocol,
            _ => ErrorClass::Transport,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "client is already running"),
            Self::NotRunning => write!(f, "client is not running"),
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::InvalidAddress(msg) => write!(f, "invalid address: {}", msg),
            Self::Connection(msg) => write!(f, "connection error: {}", msg),
            Self::Tls(err) => write!(f, "TLS error: {}", err),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Protocol(err) => write!(f, "protocol error: {}", err),
            Self::UnexpectedMessage(kind) => write!(f, "unexpected message type {}", kind),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tls(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Protocol(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<TlsError> for ClientError {
    fn from(err: TlsError) -> Self {
        Self::Tls(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_error_taxonomy() {
        assert_eq!(ClientError::NotRunning.class(), ErrorClass::Lifecycle);
        assert_eq!(
            ClientError::Protocol(ProtocolError::ConnectionClosed).class(),
            ErrorClass::Transport
        );
        assert_eq!(
            ClientError::Protocol(ProtocolError::UnknownMessageType(9.into())).class(),
            ErrorClass::Protocol
        );
        assert_eq!(
            ClientError::Connection("refused".into()).class(),
            ErrorClass::Transport
        );
    }

    #[test]
    fn display_messages() {
        assert_eq!(ClientError::AlreadyRunning.to_string(), "client is already running");
        assert_eq!(
            ClientError::UnexpectedMessage(MessageType::Text).to_string(),
            "unexpected message type TEXT"
        );
    }
}
