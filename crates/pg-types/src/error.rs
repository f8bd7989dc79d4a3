//! Type conversion error types.

use thiserror::Error;

/// Errors that can occur during type conversion.
#[derive(Debug, Error)]
pub enum TypeError {
    /// Value is null when non-null was expected.
    #[error("unexpected null value")]
    UnexpectedNull,

    /// Type mismatch during conversion.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        actual: String,
    },

    /// Value is out of range for target type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },

    /// Column text was not valid UTF-8.
    #[error("invalid string encoding: {0}")]
    InvalidEncoding(String),

    /// Column text could not be parsed as its declared type.
    #[error("invalid {type_name} text: {text:?}")]
    InvalidText {
        /// Declared type.
        type_name: &'static str,
        /// Offending text.
        text: String,
    },

    /// Invalid binary data.
    #[error("invalid binary data: {0}")]
    InvalidBinary(String),
}
