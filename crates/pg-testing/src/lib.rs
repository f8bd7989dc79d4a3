//! # pg-testing
//!
//! Test infrastructure for PostgreSQL driver development.
//!
//! This crate provides a mock PostgreSQL server that speaks enough of the
//! v3 frontend/backend protocol to drive the client end to end without a
//! real database: startup and authentication, simple and extended queries,
//! transaction status, and out-of-band CancelRequests.
//!
//! ## Mock Server Example
//!
//! ```rust,ignore
//! use pg_testing::mock_server::{MockColumn, MockPgServer, MockResponse, ScalarValue};
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockPgServer::builder()
//!         .with_response(
//!             "SELECT id, name FROM users",
//!             MockResponse::rows(
//!                 vec![MockColumn::int4("id"), MockColumn::text("name")],
//!                 vec![vec![ScalarValue::Int(1), ScalarValue::String("Alice".into())]],
//!             ),
//!         )
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     // Connect your client to server.addr()
//!     let addr = server.addr();
//!     // ...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_server;

pub use mock_server::{
    CancelRecord, MockColumn, MockPgServer, MockResponse, MockServerBuilder, MockServerError,
    ScalarValue,
};
