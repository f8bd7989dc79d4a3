//! Text-format encoding of parameter values.

use bytes::Bytes;

use crate::value::SqlValue;

const HEX: &[u8; 16] = b"0123456789abcdef";

impl SqlValue {
    /// Render the value in PostgreSQL's text input format.
    ///
    /// Returns `None` for NULL. `bytea` uses the `\x` hex form.
    #[must_use]
    pub fn to_text(&self) -> Option<Bytes> {
        let text = match self {
            Self::Null => return None,
            Self::Bool(true) => return Some(Bytes::from_static(b"t")),
            Self::Bool(false) => return Some(Bytes::from_static(b"f")),
            Self::SmallInt(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::BigInt(v) => v.to_string(),
            Self::Float(v) => float_text(f64::from(*v)),
            Self::Double(v) => float_text(*v),
            Self::String(v) => return Some(Bytes::copy_from_slice(v.as_bytes())),
            Self::Binary(v) => {
                let mut out = Vec::with_capacity(2 + v.len() * 2);
                out.extend_from_slice(b"\\x");
                for b in v.iter() {
                    out.push(HEX[usize::from(b >> 4)]);
                    out.push(HEX[usize::from(b & 0x0f)]);
                }
                return Some(Bytes::from(out));
            }
        };
        Some(Bytes::from(text))
    }
}

fn float_text(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_text() {
        assert_eq!(SqlValue::Bool(true).to_text().unwrap(), "t");
        assert_eq!(SqlValue::Int(-42).to_text().unwrap(), "-42");
        assert_eq!(SqlValue::Double(f64::NEG_INFINITY).to_text().unwrap(), "-Infinity");
        assert_eq!(SqlValue::Float(f32::NAN).to_text().unwrap(), "NaN");
        assert!(SqlValue::Null.to_text().is_none());
    }

    #[test]
    fn test_bytea_hex() {
        let v = SqlValue::Binary(Bytes::from_static(&[0xde, 0xad, 0x01]));
        assert_eq!(v.to_text().unwrap(), "\\xdead01");
    }
}
