//! Text-format decoding of result columns by type OID.

use bytes::Bytes;

use crate::error::TypeError;
use crate::oid;
use crate::value::SqlValue;

/// Decode a text-format column value.
///
/// `None` is SQL NULL. OIDs without a dedicated mapping decode as
/// [`SqlValue::String`].
pub fn decode_text(type_oid: u32, raw: Option<&[u8]>) -> Result<SqlValue, TypeError> {
    let Some(raw) = raw else {
        return Ok(SqlValue::Null);
    };

    if type_oid == oid::BYTEA {
        return decode_bytea(raw).map(SqlValue::Binary);
    }

    let text = std::str::from_utf8(raw).map_err(|e| TypeError::InvalidEncoding(e.to_string()))?;
    let invalid = |type_name: &'static str| TypeError::InvalidText {
        type_name,
        text: text.to_string(),
    };

    let value = match type_oid {
        oid::BOOL => match text {
            "t" => SqlValue::Bool(true),
            "f" => SqlValue::Bool(false),
            _ => return Err(invalid("bool")),
        },
        oid::INT2 => SqlValue::SmallInt(text.parse().map_err(|_| invalid("int2"))?),
        oid::INT4 => SqlValue::Int(text.parse().map_err(|_| invalid("int4"))?),
        oid::INT8 => SqlValue::BigInt(text.parse().map_err(|_| invalid("int8"))?),
        oid::OID => SqlValue::BigInt(
            text.parse::<u32>()
                .map(i64::from)
                .map_err(|_| invalid("oid"))?,
        ),
        oid::FLOAT4 => SqlValue::Float(parse_float(text).ok_or_else(|| invalid("float4"))? as f32),
        oid::FLOAT8 => SqlValue::Double(parse_float(text).ok_or_else(|| invalid("float8"))?),
        _ => SqlValue::String(text.to_string()),
    };
    Ok(value)
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => text.parse().ok(),
    }
}

fn decode_bytea(raw: &[u8]) -> Result<Bytes, TypeError> {
    let hex = raw
        .strip_prefix(b"\\x")
        .ok_or_else(|| TypeError::InvalidBinary("only hex bytea output is supported".into()))?;
    if hex.len() % 2 != 0 {
        return Err(TypeError::InvalidBinary("odd number of hex digits".into()));
    }

    let nibble = |c: u8| -> Result<u8, TypeError> {
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            b'a'..=b'f' => Ok(c - b'a' + 10),
            b'A'..=b'F' => Ok(c - b'A' + 10),
            _ => Err(TypeError::InvalidBinary(format!(
                "invalid hex digit {:?}",
                char::from(c)
            ))),
        }
    };

    hex.chunks_exact(2)
        .map(|pair| -> Result<u8, TypeError> { Ok((nibble(pair[0])? << 4) | nibble(pair[1])?) })
        .collect::<Result<Vec<u8>, TypeError>>()
        .map(Bytes::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_text(oid::BOOL, Some(b"t")).unwrap(), SqlValue::Bool(true));
        assert_eq!(decode_text(oid::INT4, Some(b"-7")).unwrap(), SqlValue::Int(-7));
        assert_eq!(
            decode_text(oid::INT8, Some(b"9000000000")).unwrap(),
            SqlValue::BigInt(9_000_000_000)
        );
        assert_eq!(
            decode_text(oid::FLOAT8, Some(b"-Infinity")).unwrap(),
            SqlValue::Double(f64::NEG_INFINITY)
        );
        assert_eq!(
            decode_text(oid::VARCHAR, Some(b"hello")).unwrap(),
            SqlValue::String("hello".into())
        );
    }

    #[test]
    fn test_decode_null() {
        assert_eq!(decode_text(oid::INT4, None).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_unknown_oid_is_text() {
        // numeric
        assert_eq!(
            decode_text(1700, Some(b"3.14")).unwrap(),
            SqlValue::String("3.14".into())
        );
    }

    #[test]
    fn test_decode_bytea() {
        assert_eq!(
            decode_text(oid::BYTEA, Some(b"\\xDEad01")).unwrap(),
            SqlValue::Binary(Bytes::from_static(&[0xde, 0xad, 0x01]))
        );
        assert!(decode_text(oid::BYTEA, Some(b"\\xabc")).is_err());
        assert!(decode_text(oid::BYTEA, Some(b"\\001")).is_err());
    }

    #[test]
    fn test_invalid_int() {
        assert!(matches!(
            decode_text(oid::INT2, Some(b"70000")),
            Err(TypeError::InvalidText { type_name: "int2", .. })
        ));
    }

    proptest! {
        #[test]
        fn bytea_text_roundtrip(v in proptest::collection::vec(any::<u8>(), 0..64)) {
            let value = SqlValue::Binary(Bytes::from(v));
            let text = value.to_text().unwrap();
            prop_assert_eq!(decode_text(oid::BYTEA, Some(text.as_ref())).unwrap(), value);
        }
    }
}
