//! Delimiter-terminated message framing.
//!
//! A frame is the JSON-encoded [`Envelope`] followed by [`DELIMITER`]:
//!
//! ```text
//! +--------------------+------+
//! |   envelope JSON    | 0x04 |
//! +--------------------+------+
//! ```
//!
//! There is no length prefix and no upper bound on frame size: the reader
//! buffers until it sees the delimiter.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::DELIMITER;
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Envelope, Message};

/// Encodes a message into a complete frame, delimiter included.
///
/// # Example
///
/// ```rust
/// use tlschat_protocol::{DELIMITER, Message, Text, encode_message};
///
/// let frame = encode_message(&Message::from(Text::new("bob", "hi"))).unwrap();
/// assert_eq!(frame.last(), Some(&DELIMITER));
/// ```
pub fn encode_message(message: &Message) -> ProtocolResult<Vec<u8>> {
    let envelope = Envelope::wrap(message)?;
    let mut frame = serde_json::to_vec(&envelope).map_err(ProtocolError::Encoding)?;
    frame.push(DELIMITER);
    Ok(frame)
}

/// Decodes one complete frame.
///
/// The frame must end with the delimiter; exactly one trailing byte is
/// stripped before the envelope is parsed.
pub fn decode_message(frame: &[u8]) -> ProtocolResult<Message> {
    let Some((&DELIMITER, body)) = frame.split_last() else {
        return Err(ProtocolError::MissingDelimiter);
    };

    let envelope: Envelope =
        serde_json::from_slice(body).map_err(ProtocolError::MalformedEnvelope)?;
    envelope.open()
}

/// Outcome of reading one frame from a healthy stream.
#[derive(Debug)]
pub enum Incoming {
    /// The frame decoded into a message.
    Message(Message),
    /// The frame was read but did not decode; the stream is still usable.
    Malformed(ProtocolError),
}

/// Reads frames from a byte stream and decodes them.
///
/// Errors returned by [`MessageReader::recv`] are always fatal for the
/// stream; decode failures come back as [`Incoming::Malformed`].
pub struct MessageReader<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::new(),
        }
    }

    /// Reads raw bytes up to and including the next delimiter.
    ///
    /// Returns [`ProtocolError::ConnectionClosed`] on EOF at a frame boundary
    /// and [`ProtocolError::IncompleteFrame`] on EOF mid-frame.
    pub async fn read_frame(&mut self) -> ProtocolResult<Vec<u8>> {
        self.buffer.clear();
        let received = self.reader.read_until(DELIMITER, &mut self.buffer).await?;

        if received == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
        if self.buffer.last() != Some(&DELIMITER) {
            return Err(ProtocolError::IncompleteFrame { received });
        }

        Ok(std::mem::take(&mut self.buffer))
    }

    /// Reads and decodes the next frame.
    pub async fn recv(&mut self) -> ProtocolResult<Incoming> {
        let frame = self.read_frame().await?;
        Ok(match decode_message(&frame) {
            Ok(message) => Incoming::Message(message),
            Err(err) => Incoming::Malformed(err),
        })
    }

    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

/// Writes frames to a byte stream, flushing after each one.
pub struct MessageWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes an already encoded frame.
    pub async fn write_frame(&mut self, frame: &[u8]) -> ProtocolResult<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Encodes and writes a message.
    pub async fn send(&mut self, message: &Message) -> ProtocolResult<()> {
        let frame = encode_message(message)?;
        self.write_frame(&frame).await
    }

    /// Shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> ProtocolResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
