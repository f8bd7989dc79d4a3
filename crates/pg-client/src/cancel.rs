//! Out-of-band query cancellation.
//!
//! PostgreSQL cancels a running statement through a separate connection:
//! the client dials the server again, optionally negotiates TLS, and sends
//! a 16-byte CancelRequest carrying the target session's process ID and
//! secret key. The server never replies; it processes the request and
//! closes the socket.
//!
//! ```text
//! [len = 16: i32][80877102: i32][process id: i32][secret key: i32]
//! ```
//!
//! A cancel request is best effort. The server may have finished the
//! statement already, and nothing reports whether anything was aborted.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pg_client::{Client, Context};
//! use std::time::Duration;
//!
//! let cancel_token = client.cancel_token();
//!
//! tokio::spawn(async move {
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     if let Err(e) = cancel_token.cancel_query().await {
//!         eprintln!("Failed to cancel: {}", e);
//!     }
//! });
//!
//! // Fails with SQLSTATE 57014 if still running after 5 seconds.
//! let result = client.query(&Context::background(), "SELECT pg_sleep(60)", &[]).await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use pg_protocol::frontend;
use pg_tls::{SslMode, TlsConnector, TlsError};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, sink};
use tokio::net::TcpStream;

use crate::error::Result;

/// Upper bound on a single cancel attempt, from dial to server close.
pub const CANCEL_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity the server assigned to a session at startup.
///
/// Used only to authorize cancel requests against that session.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BackendKey {
    /// Backend process ID.
    pub process_id: i32,
    /// Secret key.
    pub secret_key: i32,
}

impl std::fmt::Debug for BackendKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendKey")
            .field("process_id", &self.process_id)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Failure of a cancel attempt, naming the step that failed.
#[derive(Debug, Error)]
pub enum CancelError {
    /// The side connection could not be opened.
    #[error("dial: {0}")]
    Dial(#[source] std::io::Error),

    /// SSL negotiation or the TLS handshake on the side connection failed.
    #[error("TLS: {0}")]
    Tls(#[source] TlsError),

    /// Writing the CancelRequest failed.
    #[error("send: {0}")]
    Send(#[source] std::io::Error),

    /// Reading the side connection to end-of-stream failed.
    #[error("drain: {0}")]
    Drain(#[source] std::io::Error),

    /// The attempt did not finish within [`CANCEL_REQUEST_TIMEOUT`].
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Where and how to dial the side connection.
///
/// Captured once at connect time from the main connection's settings.
#[derive(Clone)]
pub(crate) struct CancelTarget {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) ssl_mode: SslMode,
    pub(crate) tls: Option<Arc<TlsConnector>>,
}

impl CancelTarget {
    /// Send a cancel request for `key`, bounded by [`CANCEL_REQUEST_TIMEOUT`].
    pub(crate) async fn cancel(&self, key: BackendKey) -> std::result::Result<(), CancelError> {
        tokio::time::timeout(CANCEL_REQUEST_TIMEOUT, self.send_cancel(key))
            .await
            .map_err(|_| CancelError::Timeout(CANCEL_REQUEST_TIMEOUT))?
    }

    async fn send_cancel(&self, key: BackendKey) -> std::result::Result<(), CancelError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(CancelError::Dial)?;
        stream.set_nodelay(true).map_err(CancelError::Dial)?;

        let mut stream = pg_tls::negotiate(stream, self.ssl_mode, self.tls.as_deref(), &self.host)
            .await
            .map_err(CancelError::Tls)?;

        let mut buf = BytesMut::with_capacity(frontend::CANCEL_REQUEST_LEN);
        frontend::cancel_request(key.process_id, key.secret_key, &mut buf);
        stream.write_all(&buf).await.map_err(CancelError::Send)?;
        stream.flush().await.map_err(CancelError::Send)?;

        // No response is defined; the server closes the socket once done.
        tokio::io::copy(&mut stream, &mut sink())
            .await
            .map_err(CancelError::Drain)?;
        let _ = stream.shutdown().await;

        tracing::debug!(process_id = key.process_id, "cancel request delivered");
        Ok(())
    }
}

impl std::fmt::Debug for CancelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ssl_mode", &self.ssl_mode)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

/// Owned handle for cancelling whatever the originating connection is
/// running, from any task.
///
/// Unlike a cancelled [`Context`](crate::Context), using this handle does
/// not mark the connection bad: the server answers the interrupted
/// statement with an ordinary error and the connection stays in sync.
#[derive(Clone, Debug)]
pub struct CancelToken {
    target: CancelTarget,
    key: BackendKey,
}

impl CancelToken {
    pub(crate) fn new(target: CancelTarget, key: BackendKey) -> Self {
        Self { target, key }
    }

    /// Ask the server to cancel the statement running on the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancel`](crate::Error::Cancel) naming the step that
    /// failed. Success only means the request was delivered.
    pub async fn cancel_query(&self) -> Result<()> {
        self.target.cancel(self.key).await?;
        Ok(())
    }

    /// The session this token targets.
    #[must_use]
    pub fn backend_key(&self) -> BackendKey {
        self.key
    }
}
