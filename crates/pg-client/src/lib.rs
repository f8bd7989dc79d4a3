//! # pg-client
//!
//! Async PostgreSQL client with context-driven, out-of-band query
//! cancellation.
//!
//! Every operation takes a [`Context`]. When the context can be cancelled,
//! a watcher task runs alongside the operation; if the context fires
//! before the operation finishes, the watcher opens a second connection
//! and sends a CancelRequest for the running statement.
//!
//! ## Features
//!
//! - **Zero-cost background calls**: [`Context::background`] never spawns
//!   a watcher
//! - **Connection-scoped cancellation**: a cancelled query, execute,
//!   prepare, begin or ping leaves the connection marked bad
//! - **Statement-scoped cancellation**: cancelling a prepared-statement
//!   execution keeps the connection usable
//! - **Transactions**: isolation levels and read-only mode
//! - **TLS**: `sslmode` disable, prefer and require over rustls
//! - **Authentication**: trust, cleartext, MD5 and SCRAM-SHA-256
//!
//! ## Connection Health
//!
//! ```text
//! good ──(connection-scoped cancel, I/O failure, FATAL error,
//!         abandoned operation, failed ping)──> bad
//! ```
//!
//! The transition is one-way. Once [`Client::is_bad`] is true every
//! operation returns [`Error::BadConnection`] and the client should be
//! discarded.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use pg_client::{Client, Config, Context, IsolationLevel, TxOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_connection_string(
//!         "host=localhost user=postgres password=secret dbname=app",
//!     )?;
//!     let mut client = Client::connect(config).await?;
//!
//!     // Abandon the query after two seconds; the server is asked to stop.
//!     let ctx = Context::with_timeout(Duration::from_secs(2));
//!     let rows = client.query(&ctx, "SELECT id, name FROM users WHERE id = $1", &[&1i32]).await?;
//!     for row in rows {
//!         let name: String = row.get(1)?;
//!         println!("User: {name}");
//!     }
//!
//!     let ctx = Context::background();
//!     let tx = client
//!         .begin_tx(&ctx, TxOptions::new().isolation(IsolationLevel::Serializable))
//!         .await?;
//!     tx.commit(&ctx).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cancel;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod instrumentation;
pub mod row;
pub mod statement;
pub mod transaction;
mod watcher;

// Re-export commonly used types
pub use cancel::{BackendKey, CANCEL_REQUEST_TIMEOUT, CancelError, CancelToken};
pub use client::Client;
pub use config::Config;
pub use context::Context;
pub use error::{Error, Result};
pub use pg_auth::Credentials;
pub use pg_protocol::{DbError, TransactionStatus};
pub use pg_tls::{SslMode, TlsConfig};
pub use pg_types::{FromSql, SqlValue, ToSql};
pub use row::{Column, Row};
pub use statement::Statement;
pub use tokio_util::sync::CancellationToken;
pub use transaction::{IsolationLevel, Transaction, TxOptions};
