//! # pg-protocol
//!
//! Pure implementation of the PostgreSQL frontend/backend protocol, version 3.
//!
//! This crate provides message encoders for everything the client sends and
//! a decoder for everything the server sends back. It contains no networking
//! logic and makes no assumptions about the async runtime; higher-level crates
//! frame these messages over a socket.
//!
//! ## Message Layout
//!
//! ```text
//! Startup-phase (untagged): [len: i32][code or version: i32][body...]
//! Regular (tagged):         [tag: u8][len: i32][body...]
//! ```
//!
//! The length always counts itself but never the tag byte.
//!
//! ## Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use pg_protocol::frontend;
//!
//! let mut buf = BytesMut::new();
//! frontend::cancel_request(4242, 0x1234_5678, &mut buf);
//! assert_eq!(buf.len(), 16);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod backend;
pub mod codec;
pub mod error;
pub mod frontend;

pub use backend::{
    AuthenticationRequest, BackendMessage, DataRow, DbError, FieldDescription, TransactionStatus,
};
pub use error::ProtocolError;
pub use frontend::{CANCEL_REQUEST_CODE, DescribeTarget, PROTOCOL_VERSION, SSL_REQUEST_CODE};
