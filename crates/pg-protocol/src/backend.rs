//! Backend (server to client) message decoding.
//!
//! [`BackendMessage::parse`] takes a tag byte and the message body (without
//! the tag or length) and produces a typed message. Framing is the caller's
//! responsibility.

use bytes::{Buf, Bytes};

use crate::codec::{read_bytes, read_cstr, read_i16, read_i32, read_u8};
use crate::error::ProtocolError;

/// Transaction status reported in ReadyForQuery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    /// Not in a transaction block.
    #[default]
    Idle,
    /// In a transaction block.
    InTransaction,
    /// In a failed transaction block; queries are rejected until rollback.
    Failed,
}

impl TransactionStatus {
    fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            b'I' => Ok(Self::Idle),
            b'T' => Ok(Self::InTransaction),
            b'E' => Ok(Self::Failed),
            other => Err(ProtocolError::InvalidValue {
                field: "transaction status",
                value: i64::from(other),
            }),
        }
    }

    /// The status byte as sent on the wire.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Idle => b'I',
            Self::InTransaction => b'T',
            Self::Failed => b'E',
        }
    }
}

/// Authentication request sent by the server during startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationRequest {
    /// Authentication succeeded.
    Ok,
    /// Server wants the password in cleartext.
    CleartextPassword,
    /// Server wants an MD5-hashed password with this salt.
    Md5Password {
        /// Four-byte salt.
        salt: [u8; 4],
    },
    /// Server offers SASL with the listed mechanisms.
    Sasl {
        /// Mechanism names, in server preference order.
        mechanisms: Vec<String>,
    },
    /// SASL challenge data.
    SaslContinue(Bytes),
    /// SASL outcome data.
    SaslFinal(Bytes),
    /// A method this client does not implement (Kerberos, GSSAPI, SSPI).
    Unsupported(i32),
}

/// Column metadata from a RowDescription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Column name.
    pub name: String,
    /// OID of the source table, or zero.
    pub table_oid: u32,
    /// Attribute number within the source table, or zero.
    pub column_id: i16,
    /// Data type OID.
    pub type_oid: u32,
    /// Data type size (negative for variable-width types).
    pub type_size: i16,
    /// Type modifier.
    pub type_modifier: i32,
    /// Format code (0 = text, 1 = binary).
    pub format: i16,
}

/// A single DataRow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
    /// Column values; `None` is SQL NULL.
    pub values: Vec<Option<Bytes>>,
}

/// Fields of an ErrorResponse or NoticeResponse.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbError {
    /// Localized severity (`ERROR`, `FATAL`, ...).
    pub severity: String,
    /// Non-localized severity, when the server sends it.
    pub severity_nonlocalized: Option<String>,
    /// SQLSTATE code.
    pub code: String,
    /// Primary message.
    pub message: String,
    /// Optional detail.
    pub detail: Option<String>,
    /// Optional hint.
    pub hint: Option<String>,
    /// Cursor position in the query string.
    pub position: Option<u32>,
}

impl DbError {
    /// SQLSTATE reported when a statement is cancelled by user request.
    pub const QUERY_CANCELED: &'static str = "57014";

    fn parse(mut body: Bytes) -> Result<Self, ProtocolError> {
        let mut err = Self::default();
        loop {
            let field = read_u8(&mut body, "error field type")?;
            if field == 0 {
                break;
            }
            let value = read_cstr(&mut body, "error field value")?;
            match field {
                b'S' => err.severity = value,
                b'V' => err.severity_nonlocalized = Some(value),
                b'C' => err.code = value,
                b'M' => err.message = value,
                b'D' => err.detail = Some(value),
                b'H' => err.hint = Some(value),
                b'P' => err.position = value.parse().ok(),
                // Other fields (where, schema, file, line, ...) are not surfaced.
                _ => {}
            }
        }
        Ok(err)
    }

    fn effective_severity(&self) -> &str {
        self.severity_nonlocalized
            .as_deref()
            .unwrap_or(&self.severity)
    }

    /// Whether the server will terminate the session after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.effective_severity(), "FATAL" | "PANIC")
    }

    /// Whether this error reports a cancelled statement.
    #[must_use]
    pub fn is_query_canceled(&self) -> bool {
        self.code == Self::QUERY_CANCELED
    }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.code, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " (detail: {detail})")?;
        }
        Ok(())
    }
}

/// A decoded backend message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    /// `R`
    Authentication(AuthenticationRequest),
    /// `K`: identity used to authorize cancel requests.
    BackendKeyData {
        /// Backend process ID.
        process_id: i32,
        /// Secret key.
        secret_key: i32,
    },
    /// `2`
    BindComplete,
    /// `3`
    CloseComplete,
    /// `C`
    CommandComplete {
        /// Command tag, e.g. `INSERT 0 3`.
        tag: String,
    },
    /// `D`
    DataRow(DataRow),
    /// `I`
    EmptyQueryResponse,
    /// `E`
    ErrorResponse(DbError),
    /// `n`
    NoData,
    /// `N`
    NoticeResponse(DbError),
    /// `A`
    NotificationResponse {
        /// Notifying backend process ID.
        process_id: i32,
        /// Channel name.
        channel: String,
        /// Payload string.
        payload: String,
    },
    /// `t`
    ParameterDescription(Vec<u32>),
    /// `S`
    ParameterStatus {
        /// Parameter name.
        name: String,
        /// Current value.
        value: String,
    },
    /// `1`
    ParseComplete,
    /// `s`
    PortalSuspended,
    /// `Z`
    ReadyForQuery(TransactionStatus),
    /// `T`
    RowDescription(Vec<FieldDescription>),
}

impl BackendMessage {
    /// Decode a message body for the given tag.
    pub fn parse(tag: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        let message = match tag {
            b'R' => Self::Authentication(parse_authentication(&mut body)?),
            b'K' => Self::BackendKeyData {
                process_id: read_i32(&mut body, "process id")?,
                secret_key: read_i32(&mut body, "secret key")?,
            },
            b'2' => Self::BindComplete,
            b'3' => Self::CloseComplete,
            b'C' => Self::CommandComplete {
                tag: read_cstr(&mut body, "command tag")?,
            },
            b'D' => Self::DataRow(parse_data_row(&mut body)?),
            b'I' => Self::EmptyQueryResponse,
            b'E' => return DbError::parse(body).map(Self::ErrorResponse),
            b'n' => Self::NoData,
            b'N' => return DbError::parse(body).map(Self::NoticeResponse),
            b'A' => Self::NotificationResponse {
                process_id: read_i32(&mut body, "notification pid")?,
                channel: read_cstr(&mut body, "notification channel")?,
                payload: read_cstr(&mut body, "notification payload")?,
            },
            b't' => {
                let count = read_i16(&mut body, "parameter count")?;
                if count < 0 {
                    return Err(ProtocolError::InvalidLength {
                        context: "parameter description",
                        length: i32::from(count),
                    });
                }
                let mut oids = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    oids.push(read_i32(&mut body, "parameter oid")? as u32);
                }
                Self::ParameterDescription(oids)
            }
            b'S' => Self::ParameterStatus {
                name: read_cstr(&mut body, "parameter name")?,
                value: read_cstr(&mut body, "parameter value")?,
            },
            b'1' => Self::ParseComplete,
            b's' => Self::PortalSuspended,
            b'Z' => {
                Self::ReadyForQuery(TransactionStatus::from_byte(read_u8(&mut body, "status")?)?)
            }
            b'T' => Self::RowDescription(parse_row_description(&mut body)?),
            other => return Err(ProtocolError::UnknownMessage { tag: other }),
        };

        if body.has_remaining() {
            return Err(ProtocolError::TrailingBytes {
                message: message.name(),
                remaining: body.remaining(),
            });
        }
        Ok(message)
    }

    /// Short message name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "Authentication",
            Self::BackendKeyData { .. } => "BackendKeyData",
            Self::BindComplete => "BindComplete",
            Self::CloseComplete => "CloseComplete",
            Self::CommandComplete { .. } => "CommandComplete",
            Self::DataRow(_) => "DataRow",
            Self::EmptyQueryResponse => "EmptyQueryResponse",
            Self::ErrorResponse(_) => "ErrorResponse",
            Self::NoData => "NoData",
            Self::NoticeResponse(_) => "NoticeResponse",
            Self::NotificationResponse { .. } => "NotificationResponse",
            Self::ParameterDescription(_) => "ParameterDescription",
            Self::ParameterStatus { .. } => "ParameterStatus",
            Self::ParseComplete => "ParseComplete",
            Self::PortalSuspended => "PortalSuspended",
            Self::ReadyForQuery(_) => "ReadyForQuery",
            Self::RowDescription(_) => "RowDescription",
        }
    }
}

fn parse_authentication(body: &mut Bytes) -> Result<AuthenticationRequest, ProtocolError> {
    let kind = read_i32(body, "authentication type")?;
    let request = match kind {
        0 => AuthenticationRequest::Ok,
        3 => AuthenticationRequest::CleartextPassword,
        5 => {
            let salt = read_bytes(body, 4, "md5 salt")?;
            AuthenticationRequest::Md5Password {
                salt: [salt[0], salt[1], salt[2], salt[3]],
            }
        }
        10 => {
            let mut mechanisms = Vec::new();
            loop {
                let name = read_cstr(body, "sasl mechanism")?;
                if name.is_empty() {
                    break;
                }
                mechanisms.push(name);
            }
            AuthenticationRequest::Sasl { mechanisms }
        }
        11 => AuthenticationRequest::SaslContinue(body.split_off(0)),
        12 => AuthenticationRequest::SaslFinal(body.split_off(0)),
        other => {
            body.advance(body.remaining());
            AuthenticationRequest::Unsupported(other)
        }
    };
    Ok(request)
}

fn parse_data_row(body: &mut Bytes) -> Result<DataRow, ProtocolError> {
    let count = read_i16(body, "column count")?;
    if count < 0 {
        return Err(ProtocolError::InvalidLength {
            context: "data row",
            length: i32::from(count),
        });
    }
    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = read_i32(body, "column length")?;
        if len == -1 {
            values.push(None);
        } else if len < 0 {
            return Err(ProtocolError::InvalidLength {
                context: "column value",
                length: len,
            });
        } else {
            values.push(Some(read_bytes(body, len as usize, "column value")?));
        }
    }
    Ok(DataRow { values })
}

fn parse_row_description(body: &mut Bytes) -> Result<Vec<FieldDescription>, ProtocolError> {
    let count = read_i16(body, "field count")?;
    if count < 0 {
        return Err(ProtocolError::InvalidLength {
            context: "row description",
            length: i32::from(count),
        });
    }
    let mut fields = Vec::with_capacity(count as usize);
    for _ in 0..count {
        fields.push(FieldDescription {
            name: read_cstr(body, "field name")?,
            table_oid: read_i32(body, "table oid")? as u32,
            column_id: read_i16(body, "column id")?,
            type_oid: read_i32(body, "type oid")? as u32,
            type_size: read_i16(body, "type size")?,
            type_modifier: read_i32(body, "type modifier")?,
            format: read_i16(body, "format code")?,
        });
    }
    Ok(fields)
}

/// Extract the affected-row count from a CommandComplete tag.
///
/// `INSERT oid rows`, `UPDATE rows`, `DELETE rows`, `SELECT rows`,
/// `MERGE rows`, `MOVE rows`, `FETCH rows` and `COPY rows` carry a count;
/// every other tag yields zero.
#[must_use]
pub fn rows_affected(tag: &str) -> u64 {
    let mut words = tag.split_whitespace();
    let Some(command) = words.next() else {
        return 0;
    };
    match command {
        "INSERT" | "UPDATE" | "DELETE" | "SELECT" | "MERGE" | "MOVE" | "FETCH" | "COPY" => tag
            .rsplit(' ')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0),
        _ => 0,
    }
}
