//! Codec error types.

use thiserror::Error;

/// Errors that can occur while framing messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// IO error on the underlying transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A message body could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] pg_protocol::ProtocolError),

    /// The declared length is smaller than the length field itself.
    #[error("invalid message length {length} for tag {tag:#04x}")]
    InvalidLength {
        /// Message tag.
        tag: u8,
        /// Declared length.
        length: i32,
    },

    /// The declared length exceeds the configured maximum.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Declared size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,
}
