//! # pg-tls
//!
//! TLS negotiation layer for PostgreSQL connections.
//!
//! PostgreSQL upgrades a plain TCP connection in-band: the client sends an
//! `SSLRequest`, the server answers with a single byte, and on `S` the TLS
//! handshake runs over the same socket before any startup traffic.
//!
//! ```text
//! TCP Connect → SSLRequest → 'S' → TLS Handshake → StartupMessage (encrypted)
//!                          → 'N' → StartupMessage (cleartext, if allowed)
//! ```
//!
//! The same negotiation is used for the main connection and for the
//! short-lived side connection that carries a cancel request.
//!
//! ## Security
//!
//! Server certificates are validated against the Mozilla root store by
//! default. `trust_server_certificate` disables validation and logs a
//! warning; it is intended for development only.
//!
//! ```rust,ignore
//! use pg_tls::{SslMode, TlsConfig, TlsConnector, negotiate};
//!
//! let connector = TlsConnector::new(TlsConfig::new())?;
//! let stream = negotiate(tcp, SslMode::Require, Some(&connector), "db.example.com").await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connector;
pub mod error;
pub mod negotiate;
pub mod stream;

pub use config::{SslMode, TlsConfig, TlsVersion};
pub use connector::{TlsConnector, default_tls_config};
pub use error::TlsError;
pub use negotiate::negotiate;
pub use stream::MaybeTlsStream;

// Re-export tokio-rustls stream type for convenience
pub use tokio_rustls::client::TlsStream;
