//! Message types and the tag registry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ProtocolError, ProtocolResult};

/// Numeric tag identifying a message variant on the wire.
///
/// Tags are stable: a variant keeps its tag forever and new variants take
/// fresh values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    Text = 0x01,
}

impl MessageType {
    /// Returns the wire tag.
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Looks up the variant registered for `tag`.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0x01 => Some(Self::Text),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for MessageType {
    type Error = ProtocolError;

    fn try_from(tag: u32) -> ProtocolResult<Self> {
        Self::from_tag(tag).ok_or_else(|| ProtocolError::UnknownMessageType(tag.into()))
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.tag())
    }
}

/// A chat line sent by a client and broadcast by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    /// Message body.
    pub text: String,
    /// Sender's display name.
    pub name: String,
    /// When the sender created the message.
    pub time: DateTime<Utc>,
}

impl Text {
    /// Creates a text stamped with the current time.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_time(name, text, Utc::now())
    }

    pub fn with_time(name: impl Into<String>, text: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            name: name.into(),
            time,
        }
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type {} | Time {} | From {} | {}",
            MessageType::Text,
            self.time.format("%Y.%m.%d %H.%M.%S"),
            self.name,
            self.text
        )
    }
}

/// Every message that can travel in a frame.
///
/// Matches outside this crate need a wildcard arm; receivers report variants
/// they do not handle as protocol errors.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    Text(Text),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Text(_) => MessageType::Text,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Self::Text(text) => Some(text),
        }
    }
}

impl From<Text> for Message {
    fn from(text: Text) -> Self {
        Self::Text(text)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => text.fmt(f),
        }
    }
}

/// Outer frame structure: a type tag plus the variant's content, still
/// undecoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Any JSON number is accepted here; [`Envelope::open`] rejects the ones
    /// that are not registered tags.
    #[serde(rename = "type")]
    pub type_tag: serde_json::Number,
    pub content: serde_json::Value,
}

impl Envelope {
    /// Wraps a message, serializing its content.
    pub fn wrap(message: &Message) -> ProtocolResult<Self> {
        let content = match message {
            Message::Text(text) => serde_json::to_value(text),
        }
        .map_err(ProtocolError::Encoding)?;

        Ok(Self {
            type_tag: message.message_type().tag().into(),
            content,
        })
    }

    /// Resolves the tag and deserializes the content into its variant.
    pub fn open(self) -> ProtocolResult<Message> {
        let message_type = self
            .type_tag
            .as_u64()
            .and_then(|tag| u32::try_from(tag).ok())
            .and_then(MessageType::from_tag)
            .ok_or(ProtocolError::UnknownMessageType(self.type_tag))?;
        let invalid = |source| ProtocolError::InvalidContent {
            message_type,
            source,
        };

        match message_type {
            MessageType::Text => serde_json::from_value(self.content)
                .map(Message::Text)
                .map_err(invalid),
        }
    }
}
