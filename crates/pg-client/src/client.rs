//! PostgreSQL client implementation.
//!
//! Every operation follows the same shape:
//!
//! ```text
//! ctx already done? ── yes ──> Err(ContextDone), no I/O
//!        │
//! connection bad? ──── yes ──> Err(BadConnection)
//!        │
//! flush scheduled ROLLBACK
//! arm watcher (skipped for a background context)
//! protocol exchange
//! stop watcher ──> reconcile outcome
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use pg_auth::{AuthError, Credentials, ScramSha256, md5_password};
use pg_codec::{CodecError, Connection};
use pg_protocol::backend::rows_affected;
use pg_protocol::{
    AuthenticationRequest, BackendMessage, DbError, DescribeTarget, TransactionStatus, frontend,
};
use pg_tls::{MaybeTlsStream, SslMode, TlsConnector};
use pg_types::{SqlValue, ToSql};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::Instrument;

use crate::cancel::{BackendKey, CancelTarget, CancelToken};
use crate::config::Config;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::instrumentation::{InstrumentationContext, span_names};
use crate::row::{Column, Row, columns_from_fields};
use crate::statement::Statement;
use crate::transaction::{Transaction, TxOptions};
use crate::watcher::{CancelWatch, ConnectionState, WatchOutcome, WatchScope};

type Transport = MaybeTlsStream<TcpStream>;

/// Everything collected between sending a request and ReadyForQuery.
#[derive(Default)]
struct Response {
    rows: Vec<Row>,
    tag: Option<String>,
    param_types: Vec<u32>,
    columns: Option<Arc<[Column]>>,
}

/// A single PostgreSQL session.
///
/// Operations take `&mut self`, so at most one runs at a time. A
/// [`CancelToken`] obtained from [`Client::cancel_token`] can interrupt the
/// running statement from another task.
pub struct Client {
    conn: Connection<Transport>,
    state: Arc<ConnectionState>,
    target: CancelTarget,
    key: BackendKey,
    parameters: HashMap<String, String>,
    status: TransactionStatus,
    /// Set while a protocol exchange is running; still set on the next call
    /// if the previous operation's future was dropped half way.
    in_flight: bool,
    pending_rollback: bool,
    next_statement: u64,
    instrumentation: InstrumentationContext,
}

impl Client {
    /// Connect to the server described by `config`.
    ///
    /// The whole establishment (dial, SSL negotiation, startup and
    /// authentication) is bounded by `config.connect_timeout`.
    pub async fn connect(config: Config) -> Result<Self> {
        let instrumentation = InstrumentationContext::new(config.host.clone(), config.port)
            .with_database(config.database.clone());
        let span = instrumentation.connection_span();

        async move {
            tracing::info!(
                host = %config.host,
                port = config.port,
                database = ?config.database,
                ssl_mode = config.ssl_mode.as_str(),
                "connecting to PostgreSQL server"
            );
            match timeout(config.connect_timeout, Self::establish(&config, instrumentation)).await
            {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(timeout = ?config.connect_timeout, "connection attempt timed out");
                    Err(Error::ConnectionTimeout)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn establish(config: &Config, instrumentation: InstrumentationContext) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        tracing::debug!("establishing TCP connection to {}", addr);
        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|e| Error::Connection(format!("{addr}: {e}")))?;
        tcp.set_nodelay(true)?;

        let tls = match config.ssl_mode {
            SslMode::Disable => None,
            SslMode::Prefer | SslMode::Require => {
                Some(Arc::new(TlsConnector::new(config.tls.clone())?))
            }
        };
        let stream = pg_tls::negotiate(tcp, config.ssl_mode, tls.as_deref(), &config.host).await?;
        let mut conn = Connection::new(stream, config.min_read_buffer_size);

        let mut buf = BytesMut::new();
        let mut params = vec![
            ("user", config.credentials.user()),
            ("client_encoding", "UTF8"),
            ("application_name", config.application_name.as_str()),
        ];
        if let Some(database) = &config.database {
            params.push(("database", database.as_str()));
        }
        frontend::startup_message(params, &mut buf);
        conn.send(buf).await?;

        authenticate(&mut conn, &config.credentials).await?;

        let mut parameters = HashMap::new();
        let mut key = None;
        let status = loop {
            match recv(&mut conn).await? {
                BackendMessage::ParameterStatus { name, value } => {
                    parameters.insert(name, value);
                }
                BackendMessage::BackendKeyData {
                    process_id,
                    secret_key,
                } => {
                    key = Some(BackendKey {
                        process_id,
                        secret_key,
                    });
                }
                BackendMessage::NoticeResponse(notice) => log_notice(&notice),
                BackendMessage::ErrorResponse(err) => return Err(Error::Server(err)),
                BackendMessage::ReadyForQuery(status) => break status,
                other => return Err(Error::UnexpectedMessage(other.name())),
            }
        };

        let key = key.unwrap_or_else(|| {
            tracing::warn!("server sent no BackendKeyData; cancel requests will be ignored");
            BackendKey {
                process_id: 0,
                secret_key: 0,
            }
        });

        tracing::info!(
            process_id = key.process_id,
            server_version = parameters.get("server_version").map(String::as_str),
            "connected"
        );

        Ok(Self {
            conn,
            state: Arc::new(ConnectionState::default()),
            target: CancelTarget {
                host: config.host.clone(),
                port: config.port,
                ssl_mode: config.ssl_mode,
                tls,
            },
            key,
            parameters,
            status,
            in_flight: false,
            pending_rollback: false,
            next_statement: 0,
            instrumentation,
        })
    }

    /// Run a query and collect its rows.
    ///
    /// Without parameters the simple query protocol is used and `sql` may
    /// hold several statements. With parameters the statement goes through
    /// an unnamed extended-protocol statement, `$1`-style placeholders.
    pub async fn query(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>> {
        let span = self.span(span_names::QUERY, sql);
        async move {
            tracing::debug!(params_count = params.len(), "executing query");
            let watch = self.start(ctx, WatchScope::Connection).await?;
            let result = if params.is_empty() {
                self.simple_query(sql).await
            } else {
                self.extended_query(sql, params).await
            };
            let response = self.finish(watch, WatchScope::Connection, result).await?;
            Ok(response.rows)
        }
        .instrument(span)
        .await
    }

    /// Run a statement and return the number of rows affected.
    pub async fn execute(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64> {
        let span = self.span(span_names::EXECUTE, sql);
        async move {
            let watch = self.start(ctx, WatchScope::Connection).await?;
            let result = if params.is_empty() {
                self.simple_query(sql).await
            } else {
                self.extended_query(sql, params).await
            };
            let response = self.finish(watch, WatchScope::Connection, result).await?;
            let rows = response.tag.as_deref().map_or(0, rows_affected);
            InstrumentationContext::record_rows_affected(&tracing::Span::current(), rows);
            Ok(rows)
        }
        .instrument(span)
        .await
    }

    /// Prepare a named statement on the server.
    pub async fn prepare(&mut self, ctx: &Context, sql: &str) -> Result<Statement> {
        let span = self.span(span_names::PREPARE, sql);
        async move {
            let name = format!("s{}", self.next_statement);
            self.next_statement += 1;

            let watch = self.start(ctx, WatchScope::Connection).await?;
            let result = self.send_prepare(&name, sql).await;
            let response = self.finish(watch, WatchScope::Connection, result).await?;

            tracing::debug!(
                statement = %name,
                params = response.param_types.len(),
                "statement prepared"
            );
            Ok(Statement::new(
                name,
                sql.to_string(),
                response.param_types,
                response.columns.unwrap_or_else(|| Arc::from(Vec::new())),
            ))
        }
        .instrument(span)
        .await
    }

    /// Run a prepared statement and collect its rows.
    ///
    /// Cancelling `ctx` aborts this execution only; the connection stays
    /// usable and the call returns the server's cancellation error.
    pub async fn query_statement(
        &mut self,
        ctx: &Context,
        statement: &Statement,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>> {
        let span = self.span(span_names::QUERY, statement.sql());
        async move {
            check_param_count(statement, params)?;
            let watch = self.start(ctx, WatchScope::Statement).await?;
            let result = self.execute_prepared(statement, params).await;
            let response = self.finish(watch, WatchScope::Statement, result).await?;
            Ok(response.rows)
        }
        .instrument(span)
        .await
    }

    /// Run a prepared statement and return the number of rows affected.
    pub async fn execute_statement(
        &mut self,
        ctx: &Context,
        statement: &Statement,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64> {
        let span = self.span(span_names::EXECUTE, statement.sql());
        async move {
            check_param_count(statement, params)?;
            let watch = self.start(ctx, WatchScope::Statement).await?;
            let result = self.execute_prepared(statement, params).await;
            let response = self.finish(watch, WatchScope::Statement, result).await?;
            let rows = response.tag.as_deref().map_or(0, rows_affected);
            InstrumentationContext::record_rows_affected(&tracing::Span::current(), rows);
            Ok(rows)
        }
        .instrument(span)
        .await
    }

    /// Release a prepared statement on the server.
    pub async fn close_statement(&mut self, ctx: &Context, statement: Statement) -> Result<()> {
        let watch = self.start(ctx, WatchScope::Connection).await?;
        let result = self.send_close(statement.name()).await;
        self.finish(watch, WatchScope::Connection, result).await?;
        tracing::debug!(statement = statement.name(), "statement closed");
        Ok(())
    }

    /// Begin a transaction.
    ///
    /// The isolation level is validated before anything is sent; a level
    /// PostgreSQL does not have fails with
    /// [`Error::UnsupportedIsolationLevel`].
    ///
    /// `ctx` covers the whole transaction, not just the `BEGIN`: if it is
    /// done before [`Transaction::commit`] or [`Transaction::rollback`],
    /// a cancel request is sent and the connection is marked bad.
    pub async fn begin_tx(&mut self, ctx: &Context, options: TxOptions) -> Result<Transaction<'_>> {
        let mode = options.mode_clause()?;
        let sql = format!("BEGIN{mode}");
        let span = self.span(span_names::BEGIN_TRANSACTION, &sql);

        async {
            let watch = self.start(ctx, WatchScope::Connection).await?;
            let result = self.send_begin(&sql).await;
            self.finish(watch, WatchScope::Connection, result).await
        }
        .instrument(span)
        .await?;

        // The begin context keeps watching until commit or rollback.
        let watch = CancelWatch::start(
            ctx,
            WatchScope::Connection,
            &self.state,
            &self.target,
            self.key,
        );
        tracing::debug!(isolation = ?options.isolation, read_only = options.read_only, "transaction started");
        Ok(Transaction::new(self, options, watch))
    }

    /// Check that the connection is alive.
    ///
    /// Any failure other than cancellation is reported as
    /// [`Error::BadConnection`], and the connection is marked bad.
    pub async fn ping(&mut self, ctx: &Context) -> Result<()> {
        let span = self.span(span_names::PING, ";");
        async move {
            let watch = self.start(ctx, WatchScope::Connection).await?;
            let result = self.simple_query(";").await;
            match self.finish(watch, WatchScope::Connection, result).await {
                Ok(_) => Ok(()),
                Err(Error::Cancelled) => Err(Error::Cancelled),
                Err(e) => {
                    tracing::debug!(error = %e, "ping failed");
                    self.mark_bad();
                    Err(Error::BadConnection)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Terminate the session and close the socket.
    pub async fn close(mut self) -> Result<()> {
        tracing::debug!(process_id = self.key.process_id, "closing connection");
        if !self.state.is_bad() && !self.in_flight {
            let mut buf = BytesMut::new();
            frontend::terminate(&mut buf);
            self.conn.send(buf).await?;
        }
        self.conn.close().await?;
        Ok(())
    }

    /// A handle that cancels whatever this connection is running.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken::new(self.target.clone(), self.key)
    }

    /// Whether the connection has been marked unusable.
    #[must_use]
    pub fn is_bad(&self) -> bool {
        self.state.is_bad()
    }

    /// The process ID and secret key issued at startup.
    #[must_use]
    pub fn backend_key(&self) -> BackendKey {
        self.key
    }

    /// A server run-time parameter reported through ParameterStatus.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Transaction status from the last ReadyForQuery.
    #[must_use]
    pub fn transaction_status(&self) -> TransactionStatus {
        self.status
    }

    /// Send `COMMIT` or `ROLLBACK` and return the command tag.
    pub(crate) async fn end_transaction(&mut self, ctx: &Context, command: &str) -> Result<String> {
        let span = self.span(span_names::END_TRANSACTION, command);
        async move {
            let watch = self.start(ctx, WatchScope::Connection).await?;
            let result = self.simple_query(command).await;
            if result.is_err() && self.status != TransactionStatus::Idle {
                self.mark_bad();
            }
            let response = self.finish(watch, WatchScope::Connection, result).await?;
            Ok(response.tag.unwrap_or_default())
        }
        .instrument(span)
        .await
    }

    pub(crate) fn mark_bad(&self) {
        if self.state.mark_bad() {
            tracing::warn!(process_id = self.key.process_id, "connection marked bad");
        }
    }

    pub(crate) fn schedule_rollback(&mut self) {
        self.pending_rollback = true;
    }

    fn span(&self, name: &'static str, sql: &str) -> tracing::Span {
        self.instrumentation
            .statement_span(name, sql, self.key.process_id)
    }

    /// Common entry checks, then arm the watcher.
    async fn start(&mut self, ctx: &Context, scope: WatchScope) -> Result<Option<CancelWatch>> {
        if ctx.is_done() {
            return Err(Error::ContextDone);
        }
        self.ensure_usable()?;

        if std::mem::take(&mut self.pending_rollback) && self.status != TransactionStatus::Idle {
            tracing::debug!("rolling back abandoned transaction");
            self.in_flight = true;
            let result = self.simple_query("ROLLBACK").await;
            self.in_flight = false;
            if let Err(e) = result {
                if e.is_bad_connection() {
                    self.mark_bad();
                }
                return Err(e);
            }
        }

        let watch = CancelWatch::start(ctx, scope, &self.state, &self.target, self.key);
        self.in_flight = true;
        Ok(watch)
    }

    /// Stop the watcher and decide what the caller sees.
    async fn finish<T>(
        &mut self,
        watch: Option<CancelWatch>,
        scope: WatchScope,
        result: Result<T>,
    ) -> Result<T> {
        self.in_flight = false;
        self.resolve_watch(watch, scope).await?;

        if let Err(e) = &result {
            if e.is_bad_connection() {
                self.mark_bad();
            }
        }
        result
    }

    /// Stop a watcher. A fired connection-scoped watcher leaves the socket
    /// mid-exchange, so it is closed and the caller sees `Cancelled`.
    pub(crate) async fn resolve_watch(
        &mut self,
        watch: Option<CancelWatch>,
        scope: WatchScope,
    ) -> Result<()> {
        let outcome = match watch {
            Some(mut watch) => watch.stop().await,
            None => WatchOutcome::Completed,
        };

        if outcome == WatchOutcome::Cancelled && scope == WatchScope::Connection {
            self.mark_bad();
            let _ = self.conn.close().await;
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn ensure_usable(&mut self) -> Result<()> {
        if self.in_flight {
            tracing::warn!(
                process_id = self.key.process_id,
                "previous operation was abandoned mid-exchange"
            );
            self.in_flight = false;
            self.mark_bad();
        }
        if self.state.is_bad() {
            return Err(Error::BadConnection);
        }
        Ok(())
    }

    async fn simple_query(&mut self, sql: &str) -> Result<Response> {
        let mut buf = BytesMut::new();
        frontend::query(sql, &mut buf);
        self.conn.send(buf).await?;
        self.read_response(None).await
    }

    async fn extended_query(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Response> {
        let values = encode_params(params)?;
        let types: Vec<u32> = values.iter().map(SqlValue::type_oid).collect();
        let texts: Vec<Option<Bytes>> = values.iter().map(SqlValue::to_text).collect();

        let mut buf = BytesMut::new();
        frontend::parse("", sql, &types, &mut buf);
        frontend::bind("", "", texts.iter().map(Option::as_deref), &mut buf);
        frontend::describe(DescribeTarget::Portal, "", &mut buf);
        frontend::execute("", 0, &mut buf);
        frontend::sync(&mut buf);
        self.conn.send(buf).await?;
        self.read_response(None).await
    }

    async fn send_prepare(&mut self, name: &str, sql: &str) -> Result<Response> {
        let mut buf = BytesMut::new();
        frontend::parse(name, sql, &[], &mut buf);
        frontend::describe(DescribeTarget::Statement, name, &mut buf);
        frontend::sync(&mut buf);
        self.conn.send(buf).await?;
        self.read_response(None).await
    }

    async fn send_close(&mut self, name: &str) -> Result<Response> {
        let mut buf = BytesMut::new();
        frontend::close(DescribeTarget::Statement, name, &mut buf);
        frontend::sync(&mut buf);
        self.conn.send(buf).await?;
        self.read_response(None).await
    }

    async fn execute_prepared(
        &mut self,
        statement: &Statement,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Response> {
        let values = encode_params(params)?;
        let texts: Vec<Option<Bytes>> = values.iter().map(SqlValue::to_text).collect();

        let mut buf = BytesMut::new();
        frontend::bind("", statement.name(), texts.iter().map(Option::as_deref), &mut buf);
        frontend::execute("", 0, &mut buf);
        frontend::sync(&mut buf);
        self.conn.send(buf).await?;
        self.read_response(Some(statement.shared_columns())).await
    }

    async fn send_begin(&mut self, sql: &str) -> Result<Response> {
        if self.status != TransactionStatus::Idle {
            return Err(Error::Transaction(
                "connection is already in a transaction".into(),
            ));
        }
        let response = self.simple_query(sql).await?;
        if response.tag.as_deref() != Some("BEGIN")
            || self.status != TransactionStatus::InTransaction
        {
            self.mark_bad();
            return Err(Error::Transaction(format!(
                "unexpected response to BEGIN: tag {:?}, status {:?}",
                response.tag, self.status
            )));
        }
        Ok(response)
    }

    /// Read until ReadyForQuery.
    ///
    /// A non-fatal ErrorResponse is held until ReadyForQuery so the
    /// connection is left in sync. Fatal errors return immediately.
    async fn read_response(&mut self, mut columns: Option<Arc<[Column]>>) -> Result<Response> {
        let mut response = Response::default();
        let mut error: Option<DbError> = None;

        loop {
            match recv(&mut self.conn).await? {
                BackendMessage::RowDescription(fields) => {
                    let described = columns_from_fields(&fields);
                    response.columns = Some(Arc::clone(&described));
                    columns = Some(described);
                }
                BackendMessage::NoData => {
                    response.columns = Some(Arc::from(Vec::new()));
                }
                BackendMessage::DataRow(row) => {
                    let Some(columns) = &columns else {
                        return Err(Error::UnexpectedMessage("DataRow without RowDescription"));
                    };
                    response.rows.push(Row::new(Arc::clone(columns), row.values));
                }
                BackendMessage::CommandComplete { tag } => response.tag = Some(tag),
                BackendMessage::ParameterDescription(types) => response.param_types = types,
                BackendMessage::EmptyQueryResponse
                | BackendMessage::ParseComplete
                | BackendMessage::BindComplete
                | BackendMessage::CloseComplete
                | BackendMessage::PortalSuspended => {}
                BackendMessage::ErrorResponse(err) => {
                    if err.is_fatal() {
                        return Err(Error::Server(err));
                    }
                    error.get_or_insert(err);
                }
                BackendMessage::NoticeResponse(notice) => log_notice(&notice),
                BackendMessage::NotificationResponse {
                    process_id,
                    channel,
                    payload,
                } => {
                    tracing::debug!(process_id, channel = %channel, payload = %payload, "notification");
                }
                BackendMessage::ParameterStatus { name, value } => {
                    tracing::debug!(name = %name, value = %value, "parameter changed");
                    self.parameters.insert(name, value);
                }
                BackendMessage::ReadyForQuery(status) => {
                    self.status = status;
                    break;
                }
                other => return Err(Error::UnexpectedMessage(other.name())),
            }
        }

        match error {
            Some(err) => Err(Error::Server(err)),
            None => Ok(response),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("key", &self.key)
            .field("target", &self.target)
            .field("status", &self.status)
            .field("bad", &self.state.is_bad())
            .finish_non_exhaustive()
    }
}

/// Read one message, reporting end of stream as [`Error::ConnectionClosed`].
async fn recv(conn: &mut Connection<Transport>) -> Result<BackendMessage> {
    match conn.read_message().await {
        Ok(message) => Ok(message),
        Err(CodecError::ConnectionClosed) => Err(Error::ConnectionClosed),
        Err(e) => Err(e.into()),
    }
}

async fn authenticate(conn: &mut Connection<Transport>, credentials: &Credentials) -> Result<()> {
    let mut scram: Option<ScramSha256> = None;

    loop {
        let request = match recv(conn).await? {
            BackendMessage::Authentication(request) => request,
            BackendMessage::ErrorResponse(err) => return Err(Error::Server(err)),
            BackendMessage::NoticeResponse(notice) => {
                log_notice(&notice);
                continue;
            }
            other => return Err(Error::UnexpectedMessage(other.name())),
        };

        let mut buf = BytesMut::new();
        match request {
            AuthenticationRequest::Ok => {
                tracing::debug!(user = credentials.user(), "authenticated");
                return Ok(());
            }
            AuthenticationRequest::CleartextPassword => {
                tracing::debug!("server requested cleartext password");
                let password = credentials.password().ok_or(AuthError::PasswordRequired)?;
                frontend::password_message(password, &mut buf);
            }
            AuthenticationRequest::Md5Password { salt } => {
                tracing::debug!("server requested MD5 password");
                let password = credentials.password().ok_or(AuthError::PasswordRequired)?;
                let hashed = md5_password(credentials.user(), password, &salt);
                frontend::password_message(&hashed, &mut buf);
            }
            AuthenticationRequest::Sasl { mechanisms } => {
                if !mechanisms.iter().any(|m| m == ScramSha256::MECHANISM) {
                    return Err(AuthError::UnsupportedMethod(format!(
                        "SASL mechanisms {mechanisms:?}"
                    ))
                    .into());
                }
                let password = credentials.password().ok_or(AuthError::PasswordRequired)?;
                let client = ScramSha256::new(password);
                frontend::sasl_initial_response(
                    ScramSha256::MECHANISM,
                    &client.client_first(),
                    &mut buf,
                );
                scram = Some(client);
            }
            AuthenticationRequest::SaslContinue(data) => {
                let client = scram
                    .as_mut()
                    .ok_or(Error::UnexpectedMessage("SASLContinue before SASL"))?;
                let reply = client.handle_server_first(&data)?;
                frontend::sasl_response(&reply, &mut buf);
            }
            AuthenticationRequest::SaslFinal(data) => {
                let client = scram
                    .as_mut()
                    .ok_or(Error::UnexpectedMessage("SASLFinal before SASL"))?;
                client.verify_server_final(&data)?;
                continue;
            }
            AuthenticationRequest::Unsupported(code) => {
                return Err(AuthError::UnsupportedMethod(format!("request code {code}")).into());
            }
        }
        conn.send(buf).await?;
    }
}

fn encode_params(params: &[&(dyn ToSql + Sync)]) -> Result<Vec<SqlValue>> {
    params
        .iter()
        .map(|p| p.to_sql().map_err(Error::from))
        .collect()
}

fn check_param_count(statement: &Statement, params: &[&(dyn ToSql + Sync)]) -> Result<()> {
    let expected = statement.param_types().len();
    if params.len() != expected {
        return Err(Error::Query(format!(
            "statement {} expects {expected} parameters, got {}",
            statement.name(),
            params.len()
        )));
    }
    Ok(())
}

fn log_notice(notice: &DbError) {
    tracing::info!(
        severity = %notice.severity,
        code = %notice.code,
        message = %notice.message,
        "server notice"
    );
}
