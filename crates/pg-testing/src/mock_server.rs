//! Mock PostgreSQL server for unit testing.
//!
//! This module provides a mock PostgreSQL backend that can be used for
//! testing without requiring a real database instance.
//!
//! ## Features
//!
//! - Startup handshake (SSLRequest answered with `N`, optional cleartext
//!   password, ParameterStatus, BackendKeyData)
//! - Simple and extended query flows with configurable responses
//! - Transaction status tracking for `BEGIN`/`COMMIT`/`ROLLBACK`
//! - CancelRequest handling: a matching request aborts the session's
//!   in-flight delayed response with SQLSTATE 57014
//! - Connection counters, a query log and forced disconnects
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use pg_testing::mock_server::{MockPgServer, MockResponse};
//!
//! #[tokio::test]
//! async fn test_query() {
//!     let server = MockPgServer::builder()
//!         .with_response("SELECT 1", MockResponse::scalar_int(1))
//!         .with_response(
//!             "SELECT pg_sleep(1)",
//!             MockResponse::delayed(Duration::from_secs(1), MockResponse::command("SELECT 1")),
//!         )
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let addr = server.addr();
//!     // Connect your client to addr...
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use pg_protocol::codec::{read_cstr, read_i16, read_i32, read_u8, write_cstr, write_framed};
use pg_protocol::{CANCEL_REQUEST_CODE, PROTOCOL_VERSION, SSL_REQUEST_CODE, TransactionStatus};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::task::AbortHandle;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<pg_protocol::ProtocolError> for MockServerError {
    fn from(e: pg_protocol::ProtocolError) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

// =============================================================================
// Responses
// =============================================================================

/// Mock response configuration.
#[derive(Clone)]
pub enum MockResponse {
    /// Return rows.
    Rows {
        /// Column definitions.
        columns: Vec<MockColumn>,
        /// Row data.
        rows: Vec<Vec<ScalarValue>>,
    },

    /// Return only a CommandComplete with this tag (e.g. `INSERT 0 3`).
    Command(String),

    /// Return EmptyQueryResponse.
    Empty,

    /// Return an ErrorResponse with severity `ERROR`.
    Error {
        /// SQLSTATE code.
        code: String,
        /// Message text.
        message: String,
    },

    /// Wait before answering. A matching CancelRequest received during
    /// the wait replaces the answer with a 57014 error.
    Delayed {
        /// How long to wait.
        delay: Duration,
        /// Response sent after the wait.
        response: Box<MockResponse>,
    },

    /// Execute a custom handler.
    Custom(Arc<dyn Fn(&str) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", rows)
                .finish(),
            Self::Command(tag) => f.debug_tuple("Command").field(tag).finish(),
            Self::Empty => f.write_str("Empty"),
            Self::Error { code, message } => f
                .debug_struct("Error")
                .field("code", code)
                .field("message", message)
                .finish(),
            Self::Delayed { delay, response } => f
                .debug_struct("Delayed")
                .field("delay", delay)
                .field("response", response)
                .finish(),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// A single `int4` column named `?column?` with one row.
    pub fn scalar_int(value: i32) -> Self {
        Self::rows(
            vec![MockColumn::int4("?column?")],
            vec![vec![ScalarValue::Int(value)]],
        )
    }

    /// A single `text` column named `?column?` with one row.
    pub fn scalar_string(value: impl Into<String>) -> Self {
        Self::rows(
            vec![MockColumn::text("?column?")],
            vec![vec![ScalarValue::String(value.into())]],
        )
    }

    /// Create a multi-row response.
    pub fn rows(columns: Vec<MockColumn>, rows: Vec<Vec<ScalarValue>>) -> Self {
        Self::Rows { columns, rows }
    }

    /// Create a command-tag-only response.
    pub fn command(tag: impl Into<String>) -> Self {
        Self::Command(tag.into())
    }

    /// Create an error response.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wrap a response with a server-side delay.
    pub fn delayed(delay: Duration, response: MockResponse) -> Self {
        Self::Delayed {
            delay,
            response: Box::new(response),
        }
    }

    /// Create a response computed from the SQL text.
    pub fn custom(f: impl Fn(&str) -> MockResponse + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Resolve `Custom` handlers against the SQL text.
    fn resolve(self, sql: &str) -> Self {
        match self {
            Self::Custom(f) => f(sql).resolve(sql),
            Self::Delayed { delay, response } => Self::Delayed {
                delay,
                response: Box::new(response.resolve(sql)),
            },
            other => other,
        }
    }

    fn columns(&self) -> Option<&[MockColumn]> {
        match self {
            Self::Rows { columns, .. } => Some(columns),
            Self::Delayed { response, .. } => response.columns(),
            _ => None,
        }
    }
}

/// Scalar value for mock responses, sent in text format.
#[derive(Debug, Clone)]
pub enum ScalarValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    BigInt(i64),
    /// 64-bit float.
    Double(f64),
    /// String value.
    String(String),
    /// Binary data, sent in `\x` hex form.
    Binary(Vec<u8>),
}

impl ScalarValue {
    fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(v) => Some(if *v { "t" } else { "f" }.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::BigInt(v) => Some(v.to_string()),
            Self::Double(v) => Some(v.to_string()),
            Self::String(v) => Some(v.clone()),
            Self::Binary(v) => {
                let mut out = String::with_capacity(2 + v.len() * 2);
                out.push_str("\\x");
                for b in v {
                    out.push_str(&format!("{b:02x}"));
                }
                Some(out)
            }
        }
    }
}

/// Column definition for mock responses.
#[derive(Debug, Clone)]
pub struct MockColumn {
    /// Column name.
    pub name: String,
    /// Type OID.
    pub type_oid: u32,
    /// Type size as reported in RowDescription.
    pub type_size: i16,
}

impl MockColumn {
    /// Create a column with an explicit type OID.
    pub fn new(name: impl Into<String>, type_oid: u32, type_size: i16) -> Self {
        Self {
            name: name.into(),
            type_oid,
            type_size,
        }
    }

    /// `bool` column.
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, 16, 1)
    }

    /// `int4` column.
    pub fn int4(name: impl Into<String>) -> Self {
        Self::new(name, 23, 4)
    }

    /// `int8` column.
    pub fn int8(name: impl Into<String>) -> Self {
        Self::new(name, 20, 8)
    }

    /// `float8` column.
    pub fn float8(name: impl Into<String>) -> Self {
        Self::new(name, 701, 8)
    }

    /// `text` column.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, 25, -1)
    }

    /// `bytea` column.
    pub fn bytea(name: impl Into<String>) -> Self {
        Self::new(name, 17, -1)
    }
}

// =============================================================================
// Configuration and builder
// =============================================================================

/// Configuration for the mock server.
pub struct MockServerConfig {
    /// Pre-configured responses keyed by exact SQL text.
    responses: HashMap<String, MockResponse>,
    /// Response for unmatched queries.
    default_response: MockResponse,
    /// Password to demand with AuthenticationCleartextPassword.
    password: Option<String>,
    /// Reported `server_version`.
    server_version: String,
}

/// Builder for [`MockPgServer`].
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MockServerConfig {
                responses: HashMap::new(),
                default_response: MockResponse::command("SELECT 0"),
                password: None,
                server_version: "16.0 (mock)".to_string(),
            },
        }
    }

    /// Add a response for a specific SQL query.
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.config.responses.insert(sql.into(), response);
        self
    }

    /// Set the default response for unmatched queries.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = response;
        self
    }

    /// Require this password (cleartext authentication).
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the reported `server_version`.
    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.config.server_version = version.into();
        self
    }

    /// Build and start the mock server.
    pub async fn build(self) -> Result<MockPgServer> {
        MockPgServer::start(self.config).await
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Server
// =============================================================================

/// A CancelRequest received by the mock server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelRecord {
    /// Process ID carried by the request.
    pub process_id: i32,
    /// Secret key carried by the request.
    pub secret_key: i32,
    /// Whether the pair identified a live session.
    pub matched: bool,
}

struct SessionHandle {
    secret_key: i32,
    cancel: Arc<Notify>,
}

struct Shared {
    config: MockServerConfig,
    next_pid: AtomicI32,
    sessions: Mutex<HashMap<i32, SessionHandle>>,
    tasks: Mutex<Vec<AbortHandle>>,
    cancel_requests: Mutex<Vec<CancelRecord>>,
    query_log: Mutex<Vec<String>>,
    total_connections: AtomicUsize,
    active_connections: AtomicUsize,
}

impl Shared {
    fn find_response(&self, sql: &str) -> MockResponse {
        self.config
            .responses
            .get(sql)
            .cloned()
            .unwrap_or_else(|| self.config.default_response.clone())
            .resolve(sql)
    }

    async fn log_query(&self, sql: &str) {
        self.query_log.lock().await.push(sql.to_string());
    }
}

/// A mock PostgreSQL server for testing.
///
/// Binds to an ephemeral port on `127.0.0.1` and serves each connection on
/// its own task. Dropping the server stops the accept loop.
pub struct MockPgServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    shared: Arc<Shared>,
}

impl MockPgServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let shared = Arc::new(Shared {
            config,
            next_pid: AtomicI32::new(1000),
            sessions: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            cancel_requests: Mutex::new(Vec::new()),
            query_log: Mutex::new(Vec::new()),
            total_connections: AtomicUsize::new(0),
            active_connections: AtomicUsize::new(0),
        });

        let mut shutdown_rx = shutdown_tx.subscribe();
        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer_addr)) => {
                                let shared = Arc::clone(&accept_shared);
                                shared.total_connections.fetch_add(1, Ordering::SeqCst);
                                shared.active_connections.fetch_add(1, Ordering::SeqCst);
                                let task = tokio::spawn(async move {
                                    let _active = ActiveGuard(Arc::clone(&shared));
                                    if let Err(e) = handle_connection(stream, &shared).await {
                                        tracing::debug!(error = %e, "mock connection ended with error");
                                    }
                                });
                                accept_shared.tasks.lock().await.push(task.abort_handle());
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "mock accept error");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(Self {
            addr,
            shutdown_tx,
            shared,
        })
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the host string for connection configuration.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of connections accepted so far, cancel connections included.
    pub fn total_connections(&self) -> usize {
        self.shared.total_connections.load(Ordering::SeqCst)
    }

    /// Number of connections currently open.
    pub fn active_connections(&self) -> usize {
        self.shared.active_connections.load(Ordering::SeqCst)
    }

    /// All CancelRequests received so far.
    pub async fn cancel_requests(&self) -> Vec<CancelRecord> {
        self.shared.cancel_requests.lock().await.clone()
    }

    /// SQL text of every simple query and every executed portal, in order.
    pub async fn query_log(&self) -> Vec<String> {
        self.shared.query_log.lock().await.clone()
    }

    /// Backend key of the live session with this process ID, if any.
    pub async fn session_secret(&self, process_id: i32) -> Option<i32> {
        self.shared
            .sessions
            .lock()
            .await
            .get(&process_id)
            .map(|s| s.secret_key)
    }

    /// Forcibly close every open connection.
    pub async fn kill_connections(&self) {
        for task in self.shared.tasks.lock().await.drain(..) {
            task.abort();
        }
    }

    /// Stop accepting new connections.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockPgServer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ActiveGuard(Arc<Shared>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

struct SessionGuard {
    shared: Arc<Shared>,
    process_id: i32,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Also runs when the connection task is aborted, so the removal
        // cannot be awaited here.
        let shared = Arc::clone(&self.shared);
        let process_id = self.process_id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                shared.sessions.lock().await.remove(&process_id);
            });
        }
    }
}

// =============================================================================
// Connection handling
// =============================================================================

/// Read an untagged startup-phase packet: length then body.
async fn read_startup_packet(stream: &mut TcpStream) -> Result<Bytes> {
    let len = stream.read_i32().await?;
    if !(8..=10_000).contains(&len) {
        return Err(MockServerError::Protocol(format!(
            "invalid startup packet length {len}"
        )));
    }
    let mut body = vec![0u8; len as usize - 4];
    stream.read_exact(&mut body).await?;
    Ok(Bytes::from(body))
}

/// Read a tagged frontend message.
async fn read_message(stream: &mut TcpStream) -> Result<(u8, Bytes)> {
    let tag = stream.read_u8().await?;
    let len = stream.read_i32().await?;
    if len < 4 {
        return Err(MockServerError::Protocol(format!(
            "invalid message length {len}"
        )));
    }
    let mut body = vec![0u8; len as usize - 4];
    stream.read_exact(&mut body).await?;
    Ok((tag, Bytes::from(body)))
}

async fn handle_connection(mut stream: TcpStream, shared: &Arc<Shared>) -> Result<()> {
    // Step 1: startup, answering any SSLRequest with 'N'
    let mut startup = loop {
        let mut body = read_startup_packet(&mut stream).await?;
        let code = read_i32(&mut body, "startup code")?;
        match code {
            SSL_REQUEST_CODE => stream.write_all(b"N").await?,
            CANCEL_REQUEST_CODE => return handle_cancel_request(body, shared).await,
            PROTOCOL_VERSION => break body,
            other => {
                return Err(MockServerError::Protocol(format!(
                    "unsupported protocol code {other}"
                )));
            }
        }
    };

    let mut params = HashMap::new();
    loop {
        let key = read_cstr(&mut startup, "startup key")?;
        if key.is_empty() {
            break;
        }
        let value = read_cstr(&mut startup, "startup value")?;
        params.insert(key, value);
    }

    // Step 2: authentication
    if let Some(expected) = &shared.config.password {
        let mut out = BytesMut::new();
        write_framed(&mut out, Some(b'R'), |b| b.put_i32(3));
        stream.write_all(&out).await?;

        let (tag, mut body) = read_message(&mut stream).await?;
        let supplied = if tag == b'p' {
            read_cstr(&mut body, "password")?
        } else {
            String::new()
        };
        if supplied != *expected {
            let mut out = BytesMut::new();
            encode_error(&mut out, "FATAL", "28P01", "password authentication failed");
            stream.write_all(&out).await?;
            return Ok(());
        }
    }

    // Step 3: session registration and startup response
    let process_id = shared.next_pid.fetch_add(1, Ordering::SeqCst);
    let secret_key = (process_id as u32).wrapping_mul(2_654_435_761) as i32;
    let cancel = Arc::new(Notify::new());
    shared.sessions.lock().await.insert(
        process_id,
        SessionHandle {
            secret_key,
            cancel: Arc::clone(&cancel),
        },
    );
    let _session = SessionGuard {
        shared: Arc::clone(shared),
        process_id,
    };

    let mut out = BytesMut::new();
    write_framed(&mut out, Some(b'R'), |b| b.put_i32(0));
    let application_name = params.get("application_name").cloned().unwrap_or_default();
    for (name, value) in [
        ("server_version", shared.config.server_version.as_str()),
        ("server_encoding", "UTF8"),
        ("client_encoding", "UTF8"),
        ("DateStyle", "ISO, MDY"),
        ("integer_datetimes", "on"),
        ("standard_conforming_strings", "on"),
        ("application_name", application_name.as_str()),
    ] {
        write_framed(&mut out, Some(b'S'), |b| {
            write_cstr(b, name);
            write_cstr(b, value);
        });
    }
    write_framed(&mut out, Some(b'K'), |b| {
        b.put_i32(process_id);
        b.put_i32(secret_key);
    });
    encode_ready(&mut out, TransactionStatus::Idle);
    stream.write_all(&out).await?;

    tracing::debug!(process_id, user = ?params.get("user"), "mock session started");

    // Step 4: query loop
    let mut session = Session {
        shared: Arc::clone(shared),
        cancel,
        status: TransactionStatus::Idle,
        statements: HashMap::new(),
        portals: HashMap::new(),
        skip_until_sync: false,
    };

    loop {
        let (tag, body) = match read_message(&mut stream).await {
            Ok(m) => m,
            Err(MockServerError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };
        if tag == b'X' {
            break;
        }
        let mut out = BytesMut::new();
        session.handle(tag, body, &mut out).await?;
        if !out.is_empty() {
            stream.write_all(&out).await?;
        }
    }

    Ok(())
}

async fn handle_cancel_request(mut body: Bytes, shared: &Arc<Shared>) -> Result<()> {
    let process_id = read_i32(&mut body, "cancel pid")?;
    let secret_key = read_i32(&mut body, "cancel secret")?;

    let target = shared
        .sessions
        .lock()
        .await
        .get(&process_id)
        .filter(|s| s.secret_key == secret_key)
        .map(|s| Arc::clone(&s.cancel));
    let matched = target.is_some();
    if let Some(cancel) = target {
        cancel.notify_waiters();
    }
    shared.cancel_requests.lock().await.push(CancelRecord {
        process_id,
        secret_key,
        matched,
    });
    tracing::debug!(process_id, matched, "mock received cancel request");

    // The socket is closed without a reply when the task returns.
    Ok(())
}

struct PreparedStatement {
    sql: String,
    param_types: Vec<u32>,
}

struct Portal {
    sql: String,
}

struct Session {
    shared: Arc<Shared>,
    cancel: Arc<Notify>,
    status: TransactionStatus,
    statements: HashMap<String, PreparedStatement>,
    portals: HashMap<String, Portal>,
    skip_until_sync: bool,
}

impl Session {
    async fn handle(&mut self, tag: u8, mut body: Bytes, out: &mut BytesMut) -> Result<()> {
        if self.skip_until_sync && tag != b'S' {
            return Ok(());
        }
        match tag {
            b'Q' => {
                let sql = read_cstr(&mut body, "query")?;
                self.shared.log_query(&sql).await;
                self.run(&sql, true, out).await;
                // A simple query is its own sync point.
                self.skip_until_sync = false;
                encode_ready(out, self.status);
            }
            b'P' => {
                let name = read_cstr(&mut body, "statement name")?;
                let sql = read_cstr(&mut body, "statement sql")?;
                let count = read_i16(&mut body, "param count")?;
                let mut param_types = Vec::new();
                for _ in 0..count {
                    param_types.push(read_i32(&mut body, "param type")? as u32);
                }
                if param_types.is_empty() {
                    param_types = vec![0; placeholder_count(&sql)];
                }
                self.statements
                    .insert(name, PreparedStatement { sql, param_types });
                write_framed(out, Some(b'1'), |_| {});
            }
            b'B' => {
                let portal = read_cstr(&mut body, "portal")?;
                let statement = read_cstr(&mut body, "statement")?;
                let Some(stmt) = self.statements.get(&statement) else {
                    self.fail(out, "26000", &format!("prepared statement \"{statement}\" does not exist"));
                    return Ok(());
                };
                let formats = read_i16(&mut body, "format count")?;
                for _ in 0..formats {
                    read_i16(&mut body, "format")?;
                }
                let count = read_i16(&mut body, "param count")?;
                if count as usize != stmt.param_types.len() {
                    let msg = format!(
                        "bind message supplies {count} parameters, but prepared statement \"{statement}\" requires {}",
                        stmt.param_types.len()
                    );
                    self.fail(out, "08P01", &msg);
                    return Ok(());
                }
                self.portals.insert(
                    portal,
                    Portal {
                        sql: stmt.sql.clone(),
                    },
                );
                write_framed(out, Some(b'2'), |_| {});
            }
            b'D' => {
                let kind = read_u8(&mut body, "describe kind")?;
                let name = read_cstr(&mut body, "describe name")?;
                let sql = if kind == b'S' {
                    let Some(stmt) = self.statements.get(&name) else {
                        self.fail(out, "26000", &format!("prepared statement \"{name}\" does not exist"));
                        return Ok(());
                    };
                    let types = stmt.param_types.clone();
                    write_framed(out, Some(b't'), |b| {
                        b.put_i16(types.len() as i16);
                        for oid in &types {
                            b.put_u32(if *oid == 0 { 25 } else { *oid });
                        }
                    });
                    stmt.sql.clone()
                } else {
                    let Some(portal) = self.portals.get(&name) else {
                        self.fail(out, "34000", &format!("portal \"{name}\" does not exist"));
                        return Ok(());
                    };
                    portal.sql.clone()
                };
                match self.shared.find_response(&sql).columns() {
                    Some(columns) => encode_row_description(out, columns),
                    None => write_framed(out, Some(b'n'), |_| {}),
                }
            }
            b'E' => {
                let name = read_cstr(&mut body, "portal")?;
                let Some(portal) = self.portals.get(&name) else {
                    self.fail(out, "34000", &format!("portal \"{name}\" does not exist"));
                    return Ok(());
                };
                let sql = portal.sql.clone();
                self.shared.log_query(&sql).await;
                self.run(&sql, false, out).await;
            }
            b'C' => {
                let kind = read_u8(&mut body, "close kind")?;
                let name = read_cstr(&mut body, "close name")?;
                if kind == b'S' {
                    self.statements.remove(&name);
                } else {
                    self.portals.remove(&name);
                }
                write_framed(out, Some(b'3'), |_| {});
            }
            b'S' => {
                self.skip_until_sync = false;
                self.portals.remove("");
                encode_ready(out, self.status);
            }
            b'H' => {}
            other => {
                return Err(MockServerError::Protocol(format!(
                    "unexpected frontend message '{}'",
                    other as char
                )));
            }
        }
        Ok(())
    }

    /// Record an error for the current extended-protocol batch.
    fn fail(&mut self, out: &mut BytesMut, code: &str, message: &str) {
        encode_error(out, "ERROR", code, message);
        self.skip_until_sync = true;
        if self.status == TransactionStatus::InTransaction {
            self.status = TransactionStatus::Failed;
        }
    }

    /// Answer one statement. `describe` adds a RowDescription (simple
    /// protocol only; the extended flow describes separately).
    async fn run(&mut self, sql: &str, describe: bool, out: &mut BytesMut) {
        let trimmed = sql.trim().trim_end_matches(';').trim();
        let upper = trimmed.to_ascii_uppercase();

        if trimmed.is_empty() {
            write_framed(out, Some(b'I'), |_| {});
            return;
        }
        if upper.starts_with("BEGIN") || upper.starts_with("START TRANSACTION") {
            if self.status == TransactionStatus::Idle {
                self.status = TransactionStatus::InTransaction;
            }
            encode_command_complete(out, "BEGIN");
            return;
        }
        if upper == "COMMIT" || upper == "END" {
            let tag = if self.status == TransactionStatus::Failed {
                "ROLLBACK"
            } else {
                "COMMIT"
            };
            self.status = TransactionStatus::Idle;
            encode_command_complete(out, tag);
            return;
        }
        if upper == "ROLLBACK" || upper == "ABORT" {
            self.status = TransactionStatus::Idle;
            encode_command_complete(out, "ROLLBACK");
            return;
        }
        if self.status == TransactionStatus::Failed {
            self.fail(
                out,
                "25P02",
                "current transaction is aborted, commands ignored until end of transaction block",
            );
            return;
        }

        let response = match self.shared.find_response(sql) {
            MockResponse::Delayed { delay, response } => {
                // Registered before the wait so a cancel arriving at any
                // point during it is observed.
                let cancel = Arc::clone(&self.cancel);
                let cancelled = cancel.notified();
                let interrupted = tokio::select! {
                    _ = tokio::time::sleep(delay) => false,
                    _ = cancelled => true,
                };
                if interrupted {
                    self.fail(out, "57014", "canceling statement due to user request");
                    return;
                }
                *response
            }
            other => other,
        };

        match response {
            MockResponse::Rows { columns, rows } => {
                if describe {
                    encode_row_description(out, &columns);
                }
                for row in &rows {
                    encode_data_row(out, row);
                }
                encode_command_complete(out, &format!("SELECT {}", rows.len()));
            }
            MockResponse::Command(tag) => encode_command_complete(out, &tag),
            MockResponse::Empty => write_framed(out, Some(b'I'), |_| {}),
            MockResponse::Error { code, message } => self.fail(out, &code, &message),
            // Resolved before reaching here; nested delays are not supported.
            MockResponse::Delayed { .. } | MockResponse::Custom(_) => {
                self.fail(out, "XX000", "unsupported mock response")
            }
        }
    }
}

/// Highest `$n` placeholder in the SQL text.
fn placeholder_count(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if let Ok(n) = sql[start..end].parse::<usize>() {
                max = max.max(n);
            }
            i = end.max(i + 1);
        } else {
            i += 1;
        }
    }
    max
}

// =============================================================================
// Backend message encoding
// =============================================================================

fn encode_ready(dst: &mut BytesMut, status: TransactionStatus) {
    write_framed(dst, Some(b'Z'), |b| b.put_u8(status.as_byte()));
}

fn encode_command_complete(dst: &mut BytesMut, tag: &str) {
    write_framed(dst, Some(b'C'), |b| write_cstr(b, tag));
}

fn encode_error(dst: &mut BytesMut, severity: &str, code: &str, message: &str) {
    write_framed(dst, Some(b'E'), |b| {
        b.put_u8(b'S');
        write_cstr(b, severity);
        b.put_u8(b'V');
        write_cstr(b, severity);
        b.put_u8(b'C');
        write_cstr(b, code);
        b.put_u8(b'M');
        write_cstr(b, message);
        b.put_u8(0);
    });
}

fn encode_row_description(dst: &mut BytesMut, columns: &[MockColumn]) {
    write_framed(dst, Some(b'T'), |b| {
        b.put_i16(columns.len() as i16);
        for col in columns {
            write_cstr(b, &col.name);
            b.put_u32(0); // table oid
            b.put_i16(0); // column id
            b.put_u32(col.type_oid);
            b.put_i16(col.type_size);
            b.put_i32(-1); // type modifier
            b.put_i16(0); // text format
        }
    });
}

fn encode_data_row(dst: &mut BytesMut, values: &[ScalarValue]) {
    write_framed(dst, Some(b'D'), |b| {
        b.put_i16(values.len() as i16);
        for value in values {
            match value.to_text() {
                Some(text) => {
                    b.put_i32(text.len() as i32);
                    b.put_slice(text.as_bytes());
                }
                None => b.put_i32(-1),
            }
        }
    });
}
