//! PostgreSQL message codec implementation.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// Size of a tagged message header: one tag byte plus the i32 length.
pub const HEADER_SIZE: usize = 5;

/// Default upper bound on a single backend message body.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1 << 30;

/// A raw backend message: tag byte plus undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message tag.
    pub tag: u8,
    /// Message body, excluding tag and length.
    pub body: Bytes,
}

/// Message codec for tokio-util framing.
///
/// Decoding splits the stream on the tag + length header. Encoding passes
/// pre-framed buffers through untouched, since `pg-protocol`'s encoders
/// already produce complete messages.
#[derive(Debug, Clone)]
pub struct PgCodec {
    max_message_size: usize,
}

impl PgCodec {
    /// Create a codec with the default size limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Override the maximum accepted message size.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// The configured maximum message size.
    #[must_use]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Default for PgCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PgCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let tag = src[0];
        let length = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
        if length < 4 {
            return Err(CodecError::InvalidLength { tag, length });
        }
        let body_len = length as usize - 4;
        if body_len > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: body_len,
                max: self.max_message_size,
            });
        }

        let total = HEADER_SIZE + body_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let body = src.split_to(body_len).freeze();

        tracing::trace!(tag = %(tag as char), length = body_len, "decoded backend message");

        Ok(Some(Frame { tag, body }))
    }
}

impl Encoder<Bytes> for PgCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        tracing::trace!(length = item.len(), "encoded frontend messages");
        dst.extend_from_slice(&item);
        Ok(())
    }
}
