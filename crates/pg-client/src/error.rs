//! Client error types.

use pg_protocol::DbError;
use thiserror::Error;

use crate::cancel::CancelError;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection is unusable and must be discarded, not retried.
    ///
    /// Returned by every operation on a connection that was previously
    /// marked bad, and by [`Client::ping`](crate::Client::ping) when the
    /// probe fails.
    #[error("bad connection")]
    BadConnection,

    /// The operation's context was done while the exchange was running.
    ///
    /// A cancel request was sent and the connection is now bad.
    #[error("operation cancelled")]
    Cancelled,

    /// The context was already done when the operation was called.
    ///
    /// Nothing was sent and the connection is still usable.
    #[error("context done before the operation started")]
    ContextDone,

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Authentication(#[from] pg_auth::AuthError),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] pg_tls::TlsError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] pg_protocol::ProtocolError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] pg_codec::CodecError),

    /// Type conversion error.
    #[error("type error: {0}")]
    Type(#[from] pg_types::TypeError),

    /// Server returned an error.
    #[error("server error: {0}")]
    Server(DbError),

    /// The server sent a message that is not valid at this point.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(&'static str),

    /// Query execution error detected on the client side.
    #[error("query error: {0}")]
    Query(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The requested isolation level has no PostgreSQL equivalent.
    #[error("isolation level not supported: {0}")]
    UnsupportedIsolationLevel(i32),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection timeout occurred.
    #[error("connection timed out")]
    ConnectionTimeout,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An explicit cancel request failed.
    #[error("cancel request failed: {0}")]
    Cancel(#[from] CancelError),
}

impl Error {
    /// Check if the connection that produced this error must be discarded.
    #[must_use]
    pub fn is_bad_connection(&self) -> bool {
        match self {
            Self::BadConnection
            | Self::Cancelled
            | Self::ConnectionClosed
            | Self::Codec(_)
            | Self::Protocol(_)
            | Self::UnexpectedMessage(_)
            | Self::Io(_) => true,
            Self::Server(err) => err.is_fatal(),
            _ => false,
        }
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// Transient errors include timeouts, connection issues, and the
    /// server-side conditions PostgreSQL documents as retryable
    /// (serialization failures and deadlocks).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionTimeout
            | Self::ConnectionClosed
            | Self::BadConnection
            | Self::Io(_) => true,
            Self::Server(err) => matches!(err.code.as_str(), "40001" | "40P01"),
            _ => false,
        }
    }

    /// The SQLSTATE code if this is a server error.
    #[must_use]
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Server(err) => Some(&err.code),
            _ => None,
        }
    }

    /// Check if the server aborted the statement because of a cancel request.
    #[must_use]
    pub fn is_query_canceled(&self) -> bool {
        matches!(self, Self::Server(err) if err.is_query_canceled())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
