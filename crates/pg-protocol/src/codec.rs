//! Codec utilities for protocol encoding and decoding.
//!
//! This module provides the low-level primitives used by the frontend
//! encoders and backend decoders: bounds-checked integer reads, NUL
//! terminated strings, and length-prefixed framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Read a big-endian `i16`, failing if fewer than two bytes remain.
pub fn read_i16(src: &mut impl Buf, what: &'static str) -> Result<i16, ProtocolError> {
    if src.remaining() < 2 {
        return Err(ProtocolError::UnexpectedEof(what));
    }
    Ok(src.get_i16())
}

/// Read a big-endian `i32`, failing if fewer than four bytes remain.
pub fn read_i32(src: &mut impl Buf, what: &'static str) -> Result<i32, ProtocolError> {
    if src.remaining() < 4 {
        return Err(ProtocolError::UnexpectedEof(what));
    }
    Ok(src.get_i32())
}

/// Read a single byte.
pub fn read_u8(src: &mut impl Buf, what: &'static str) -> Result<u8, ProtocolError> {
    if !src.has_remaining() {
        return Err(ProtocolError::UnexpectedEof(what));
    }
    Ok(src.get_u8())
}

/// Read a NUL-terminated UTF-8 string, consuming the terminator.
pub fn read_cstr(src: &mut Bytes, what: &'static str) -> Result<String, ProtocolError> {
    let end = src
        .iter()
        .position(|&b| b == 0)
        .ok_or(ProtocolError::UnterminatedString(what))?;
    let raw = src.split_to(end);
    src.advance(1);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(what))
}

/// Split off exactly `len` bytes.
pub fn read_bytes(src: &mut Bytes, len: usize, what: &'static str) -> Result<Bytes, ProtocolError> {
    if src.remaining() < len {
        return Err(ProtocolError::UnexpectedEof(what));
    }
    Ok(src.split_to(len))
}

/// Write a NUL-terminated string.
///
/// Interior NUL bytes cannot be represented on the wire; the string is
/// truncated at the first one.
pub fn write_cstr(dst: &mut impl BufMut, s: &str) {
    let bytes = s.as_bytes();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    dst.put_slice(&bytes[..end]);
    dst.put_u8(0);
}

/// Write a length-prefixed message.
///
/// When `tag` is `Some`, the tag byte is written first and is not counted in
/// the length. The length field counts itself plus the body written by
/// `body`, and is patched in after the body is produced.
pub fn write_framed<F>(dst: &mut BytesMut, tag: Option<u8>, body: F)
where
    F: FnOnce(&mut BytesMut),
{
    if let Some(tag) = tag {
        dst.put_u8(tag);
    }
    let len_at = dst.len();
    dst.put_i32(0);
    body(dst);
    let len = (dst.len() - len_at) as i32;
    dst[len_at..len_at + 4].copy_from_slice(&len.to_be_bytes());
}
