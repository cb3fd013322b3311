//! Tokio codec turning a byte stream into [`Message`] values.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::error::ProtocolError;
use crate::message::Message;

/// Servers may send longer lines than RFC 1459's 512 when tags are present.
pub const MAX_LINE_LENGTH: usize = 8191;

/// Line-oriented IRC codec.
///
/// Unparseable or oversized lines are logged and skipped so a single bad
/// line never tears down the stream; only I/O errors are fatal.
#[derive(Debug)]
pub struct IrcCodec {
    lines: LinesCodec,
}

impl IrcCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max),
        }
    }
}

impl Default for IrcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        loop {
            let line = match self.lines.decode(src) {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(None),
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!(limit = self.lines.max_length(), "Dropping oversized line");
                    continue;
                }
                Err(LinesCodecError::Io(e)) => return Err(ProtocolError::Io(e)),
            };

            if line.trim().is_empty() {
                continue;
            }

            match line.parse::<Message>() {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => {
                    warn!(error = %e, line = %line, "Dropping unparseable line");
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        match self.decode(src)? {
            Some(msg) => Ok(Some(msg)),
            None => match self.lines.decode_eof(src) {
                Ok(Some(line)) => Ok(line.parse().ok()),
                Ok(None) => Ok(None),
                Err(LinesCodecError::MaxLineLengthExceeded) => Ok(None),
                Err(LinesCodecError::Io(e)) => Err(ProtocolError::Io(e)),
            },
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let line = msg.to_string();
        // A stray CR/LF inside a parameter would inject a second command.
        let line = match line.find(['\r', '\n']) {
            Some(idx) => &line[..idx],
            None => line.as_str(),
        };
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
