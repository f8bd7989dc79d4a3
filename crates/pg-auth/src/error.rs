//! Authentication error types.

use thiserror::Error;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The server asked for a password but none was configured.
    #[error("password required by server but none was supplied")]
    PasswordRequired,

    /// Unsupported authentication method.
    #[error("unsupported authentication method: {0}")]
    UnsupportedMethod(String),

    /// The SCRAM exchange could not proceed.
    #[error("SCRAM error: {0}")]
    Scram(String),

    /// The server's final SCRAM signature did not match.
    #[error("SCRAM server signature mismatch")]
    ServerSignatureMismatch,
}
