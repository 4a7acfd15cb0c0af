//! Framing and message types for tlschat.
//!
//! # Wire format
//!
//! Every message travels as one frame: a JSON envelope followed by a single
//! `0x04` delimiter byte.
//!
//! ```text
//! +----------------------------------------------+------+
//! | {"type": <tag>, "content": { ...payload... }} | 0x04 |
//! +----------------------------------------------+------+
//! ```
//!
//! JSON escapes every control character, so the delimiter can never occur
//! inside an encoded envelope.
//!
//! # Message types
//!
//! | Tag | Variant | Content                          |
//! |-----|---------|----------------------------------|
//! | 1   | TEXT    | `{text, name, time}` (RFC 3339)  |
//!
//! # Example
//!
//! ```rust
//! use tlschat_protocol::{Message, Text, decode_message, encode_message};
//!
//! let message = Message::from(Text::new("alice", "hello"));
//! let frame = encode_message(&message).unwrap();
//! assert_eq!(decode_message(&frame).unwrap(), message);
//! ```

mod error;
mod framing;
mod types;

pub use error::{ErrorClass, ProtocolError, ProtocolResult};
pub use framing::{Incoming, MessageReader, MessageWriter, decode_message, encode_message};
pub use types::{Envelope, Message, MessageType, Text};

/// Byte terminating every frame.
pub const DELIMITER: u8 = 0x04;
