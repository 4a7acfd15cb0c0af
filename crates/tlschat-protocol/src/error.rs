//! Protocol error types.

use thiserror::Error;

use crate::types::MessageType;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Broad failure classes shared by every tlschat error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Start/stop/send called in the wrong engine state.
    Lifecycle,
    /// Dial, listen, accept, handshake, read or write failure.
    Transport,
    /// Malformed frame, unknown tag or unexpected message type.
    Protocol,
}

/// Errors that can occur while encoding, decoding or reading frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload or envelope could not be serialized.
    #[error("encoding failed: {0}")]
    Encoding(#[source] serde_json::Error),

    /// Frame does not end with the delimiter byte.
    #[error("frame is missing the trailing delimiter")]
    MissingDelimiter,

    /// Outer envelope is not valid JSON of the expected shape.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// Envelope carries a numeric tag outside the known set.
    #[error("unknown message type {0}")]
    UnknownMessageType(serde_json::Number),

    /// Content does not match the shape of its tagged variant.
    #[error("invalid {message_type} content: {source}")]
    InvalidContent {
        message_type: MessageType,
        #[source]
        source: serde_json::Error,
    },

    /// Stream ended in the middle of a frame.
    #[error("incomplete frame: stream closed after {received} bytes without delimiter")]
    IncompleteFrame { received: usize },

    /// Stream ended cleanly between frames.
    #[error("connection closed")]
    ConnectionClosed,

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the stream that produced this error is unusable.
    ///
    /// Decode failures leave the stream positioned at the next frame, so the
    /// reader can keep going; stream failures cannot be recovered.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IncompleteFrame { .. } | Self::ConnectionClosed | Self::Io(_)
        )
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_fatal() {
            ErrorClass::Transport
        } else {
            ErrorClass::Protocol
        }
    }
}
