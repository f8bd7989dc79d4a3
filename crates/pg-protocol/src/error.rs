//! Protocol-level error types.

use thiserror::Error;

/// Errors that can occur while decoding protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Message body ended before a field could be read.
    #[error("unexpected end of message while reading {0}")]
    UnexpectedEof(&'static str),

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A C string was missing its terminating NUL byte.
    #[error("unterminated string in {0}")]
    UnterminatedString(&'static str),

    /// Unknown backend message tag.
    #[error("unknown backend message tag {tag:#04x} ('{}')", *tag as char)]
    UnknownMessage {
        /// The tag byte received.
        tag: u8,
    },

    /// A length field held an impossible value.
    #[error("invalid length {length} for {context}")]
    InvalidLength {
        /// Where the length appeared.
        context: &'static str,
        /// The value received.
        length: i32,
    },

    /// A field held a value outside its defined domain.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: i64,
    },

    /// Bytes were left over after the message was fully decoded.
    #[error("{remaining} trailing bytes after {message}")]
    TrailingBytes {
        /// Message kind.
        message: &'static str,
        /// Number of leftover bytes.
        remaining: usize,
    },
}
