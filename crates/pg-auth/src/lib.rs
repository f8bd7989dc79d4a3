//! # pg-auth
//!
//! Password authentication for PostgreSQL connections.
//!
//! The server picks the method during startup; this crate provides the
//! client side of each password-based one:
//!
//! | Server request            | Client response                       |
//! |---------------------------|---------------------------------------|
//! | `AuthenticationCleartext` | the password as-is                    |
//! | `AuthenticationMD5`       | [`md5_password`]                      |
//! | `AuthenticationSASL`      | [`ScramSha256`] exchange (RFC 7677)   |
//!
//! Kerberos, GSSAPI and SSPI are not supported.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod credentials;
pub mod error;
pub mod password;
pub mod scram;

pub use credentials::Credentials;
pub use error::AuthError;
pub use password::md5_password;
pub use scram::ScramSha256;
