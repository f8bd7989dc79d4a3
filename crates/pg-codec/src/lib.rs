//! # pg-codec
//!
//! Async framing layer for PostgreSQL backend messages.
//!
//! This crate turns a raw byte stream into typed [`BackendMessage`]s,
//! handling message reassembly across TCP segment boundaries. Outgoing
//! messages are produced by `pg-protocol`'s encoders and written as-is.
//!
//! ## Architecture
//!
//! ```text
//! TCP/TLS stream → PgCodec (tag + length framing) → BackendMessage → Client
//! ```
//!
//! Cancellation never shares this transport: a cancel request always goes out
//! on a freshly dialed socket, so the connection needs no split I/O.
//!
//! [`BackendMessage`]: pg_protocol::BackendMessage

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod connection;
pub mod error;

pub use codec::{DEFAULT_MAX_MESSAGE_SIZE, Frame, PgCodec};
pub use connection::Connection;
pub use error::CodecError;
