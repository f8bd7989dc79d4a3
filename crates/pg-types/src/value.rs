//! SQL value representation.

use bytes::Bytes;

use crate::oid;

/// A SQL value that can represent any supported PostgreSQL data type.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
    /// NULL value.
    #[default]
    Null,
    /// Boolean value (`bool`).
    Bool(bool),
    /// 16-bit signed integer (`int2`).
    SmallInt(i16),
    /// 32-bit signed integer (`int4`).
    Int(i32),
    /// 64-bit signed integer (`int8`).
    BigInt(i64),
    /// 32-bit floating point (`float4`).
    Float(f32),
    /// 64-bit floating point (`float8`).
    Double(f64),
    /// String value (`text`, `varchar`, `bpchar`, `name`, and any type
    /// without a dedicated variant).
    String(String),
    /// Binary value (`bytea`).
    Binary(Bytes),
}

impl SqlValue {
    /// Check if the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the value as a bool, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an i64, if it is an integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::BigInt(v) => Some(*v),
            Self::Int(v) => Some(i64::from(*v)),
            Self::SmallInt(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as bytes, if it is binary.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(v) => Some(v),
            _ => None,
        }
    }

    /// Get the type name for this value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "bool",
            Self::SmallInt(_) => "int2",
            Self::Int(_) => "int4",
            Self::BigInt(_) => "int8",
            Self::Float(_) => "float4",
            Self::Double(_) => "float8",
            Self::String(_) => "text",
            Self::Binary(_) => "bytea",
        }
    }

    /// The parameter type OID to declare in a Parse message.
    ///
    /// NULL is left unspecified so the server infers it from context.
    #[must_use]
    pub fn type_oid(&self) -> u32 {
        match self {
            Self::Null => oid::UNSPECIFIED,
            Self::Bool(_) => oid::BOOL,
            Self::SmallInt(_) => oid::INT2,
            Self::Int(_) => oid::INT4,
            Self::BigInt(_) => oid::INT8,
            Self::Float(_) => oid::FLOAT4,
            Self::Double(_) => oid::FLOAT8,
            Self::String(_) => oid::TEXT,
            Self::Binary(_) => oid::BYTEA,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        Self::SmallInt(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::BigInt(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(v))
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_oid() {
        assert_eq!(SqlValue::Int(1).type_oid(), 23);
        assert_eq!(SqlValue::Binary(Bytes::new()).type_oid(), 17);
        assert_eq!(SqlValue::Null.type_oid(), 0);
    }

    #[test]
    fn test_from_option() {
        assert_eq!(SqlValue::from(None::<i32>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::String("x".into()));
    }
}
