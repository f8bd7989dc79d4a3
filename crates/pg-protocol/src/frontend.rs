//! Frontend (client to server) message encoders.
//!
//! Every encoder appends one complete, framed message to `dst`, so several
//! messages can be batched into a single buffer and flushed together.

use bytes::{BufMut, BytesMut};

use crate::codec::{write_cstr, write_framed};

/// Protocol version 3.0 as sent in the StartupMessage.
pub const PROTOCOL_VERSION: i32 = 196_608;

/// Request code identifying a CancelRequest.
pub const CANCEL_REQUEST_CODE: i32 = 80_877_102;

/// Request code identifying an SSLRequest.
pub const SSL_REQUEST_CODE: i32 = 80_877_103;

/// Size of a CancelRequest on the wire, including its length field.
pub const CANCEL_REQUEST_LEN: usize = 16;

/// Target of a Describe or Close message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeTarget {
    /// A prepared statement.
    Statement,
    /// A portal.
    Portal,
}

impl DescribeTarget {
    fn tag(self) -> u8 {
        match self {
            Self::Statement => b'S',
            Self::Portal => b'P',
        }
    }
}

/// Encode a StartupMessage carrying the given run-time parameters.
pub fn startup_message<'a, I>(params: I, dst: &mut BytesMut)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    write_framed(dst, None, |b| {
        b.put_i32(PROTOCOL_VERSION);
        for (key, value) in params {
            write_cstr(b, key);
            write_cstr(b, value);
        }
        b.put_u8(0);
    });
}

/// Encode an SSLRequest.
pub fn ssl_request(dst: &mut BytesMut) {
    write_framed(dst, None, |b| b.put_i32(SSL_REQUEST_CODE));
}

/// Encode a CancelRequest.
///
/// The result is always exactly [`CANCEL_REQUEST_LEN`] bytes: the length,
/// the cancel code, the target process ID and its secret key, all
/// big-endian 32-bit integers.
pub fn cancel_request(process_id: i32, secret_key: i32, dst: &mut BytesMut) {
    write_framed(dst, None, |b| {
        b.put_i32(CANCEL_REQUEST_CODE);
        b.put_i32(process_id);
        b.put_i32(secret_key);
    });
}

/// Encode a PasswordMessage (cleartext or MD5-hashed).
pub fn password_message(password: &str, dst: &mut BytesMut) {
    write_framed(dst, Some(b'p'), |b| write_cstr(b, password));
}

/// Encode a SASLInitialResponse.
pub fn sasl_initial_response(mechanism: &str, data: &[u8], dst: &mut BytesMut) {
    write_framed(dst, Some(b'p'), |b| {
        write_cstr(b, mechanism);
        b.put_i32(data.len() as i32);
        b.put_slice(data);
    });
}

/// Encode a SASLResponse.
pub fn sasl_response(data: &[u8], dst: &mut BytesMut) {
    write_framed(dst, Some(b'p'), |b| b.put_slice(data));
}

/// Encode a simple Query.
pub fn query(sql: &str, dst: &mut BytesMut) {
    write_framed(dst, Some(b'Q'), |b| write_cstr(b, sql));
}

/// Encode a Parse message.
///
/// A zero OID in `param_types` leaves the parameter type for the server to
/// infer.
pub fn parse(name: &str, sql: &str, param_types: &[u32], dst: &mut BytesMut) {
    write_framed(dst, Some(b'P'), |b| {
        write_cstr(b, name);
        write_cstr(b, sql);
        b.put_i16(param_types.len() as i16);
        for oid in param_types {
            b.put_u32(*oid);
        }
    });
}

/// Encode a Bind message with text-format parameters and results.
///
/// `None` entries are sent as SQL NULL.
pub fn bind<'a, I>(portal: &str, statement: &str, params: I, dst: &mut BytesMut)
where
    I: IntoIterator<Item = Option<&'a [u8]>>,
    I::IntoIter: ExactSizeIterator,
{
    let params = params.into_iter();
    write_framed(dst, Some(b'B'), |b| {
        write_cstr(b, portal);
        write_cstr(b, statement);
        // All parameters use the default (text) format.
        b.put_i16(0);
        b.put_i16(params.len() as i16);
        for param in params {
            match param {
                Some(value) => {
                    b.put_i32(value.len() as i32);
                    b.put_slice(value);
                }
                None => b.put_i32(-1),
            }
        }
        // All result columns use the default (text) format.
        b.put_i16(0);
    });
}

/// Encode a Describe message.
pub fn describe(target: DescribeTarget, name: &str, dst: &mut BytesMut) {
    write_framed(dst, Some(b'D'), |b| {
        b.put_u8(target.tag());
        write_cstr(b, name);
    });
}

/// Encode an Execute message. A `max_rows` of zero means "no limit".
pub fn execute(portal: &str, max_rows: i32, dst: &mut BytesMut) {
    write_framed(dst, Some(b'E'), |b| {
        write_cstr(b, portal);
        b.put_i32(max_rows);
    });
}

/// Encode a Close message.
pub fn close(target: DescribeTarget, name: &str, dst: &mut BytesMut) {
    write_framed(dst, Some(b'C'), |b| {
        b.put_u8(target.tag());
        write_cstr(b, name);
    });
}

/// Encode a Sync message.
pub fn sync(dst: &mut BytesMut) {
    write_framed(dst, Some(b'S'), |_| {});
}

/// Encode a Terminate message.
pub fn terminate(dst: &mut BytesMut) {
    write_framed(dst, Some(b'X'), |_| {});
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_request_layout() {
        let mut buf = BytesMut::new();
        cancel_request(1234, -559_038_737, &mut buf);

        assert_eq!(buf.len(), CANCEL_REQUEST_LEN);
        assert_eq!(&buf[0..4], &16i32.to_be_bytes());
        assert_eq!(&buf[4..8], &80_877_102i32.to_be_bytes());
        assert_eq!(&buf[8..12], &1234i32.to_be_bytes());
        assert_eq!(&buf[12..16], &(-559_038_737i32).to_be_bytes());
    }

    #[test]
    fn test_ssl_request_layout() {
        let mut buf = BytesMut::new();
        ssl_request(&mut buf);
        assert_eq!(&buf[..], &[0, 0, 0, 8, 0x04, 0xd2, 0x16, 0x2f]);
    }

    #[test]
    fn test_startup_message() {
        let mut buf = BytesMut::new();
        startup_message([("user", "alice"), ("database", "db")], &mut buf);

        let len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len());
        assert_eq!(&buf[4..8], &PROTOCOL_VERSION.to_be_bytes());
        assert_eq!(&buf[8..], b"user\0alice\0database\0db\0\0");
    }

    #[test]
    fn test_query_message() {
        let mut buf = BytesMut::new();
        query(";", &mut buf);
        assert_eq!(&buf[..], &[b'Q', 0, 0, 0, 6, b';', 0]);
    }

    #[test]
    fn test_bind_with_null() {
        let mut buf = BytesMut::new();
        let params: Vec<Option<&[u8]>> = vec![Some(b"42"), None];
        bind("", "s1", params, &mut buf);

        assert_eq!(buf[0], b'B');
        // portal "", statement "s1", formats 0, count 2
        assert_eq!(&buf[5..11], b"\0s1\0\0\0");
        assert_eq!(&buf[11..13], &[0, 2]);
        assert_eq!(&buf[13..17], &2i32.to_be_bytes());
        assert_eq!(&buf[17..19], b"42");
        assert_eq!(&buf[19..23], &(-1i32).to_be_bytes());
        assert_eq!(&buf[23..25], &[0, 0]);
        assert_eq!(buf.len(), 25);
    }

    #[test]
    fn test_sync_and_terminate() {
        let mut buf = BytesMut::new();
        sync(&mut buf);
        terminate(&mut buf);
        assert_eq!(&buf[..], &[b'S', 0, 0, 0, 4, b'X', 0, 0, 0, 4]);
    }
}
