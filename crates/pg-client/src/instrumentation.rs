//! Tracing instrumentation for database operations.
//!
//! Every client operation runs inside a `tracing` span named after the
//! operation, carrying attributes that follow the OpenTelemetry database
//! semantic conventions. Any subscriber (including an OpenTelemetry bridge)
//! can consume them.
//!
//! ## Semantic Conventions
//!
//! - `db.system`: "postgresql"
//! - `db.name`: Database name
//! - `db.statement`: SQL statement (sanitized if configured)
//! - `db.operation`: Query operation type (SELECT, INSERT, etc.)
//! - `server.address`: Server hostname
//! - `server.port`: Server port

use tracing::Span;

/// Database system identifier for PostgreSQL.
pub const DB_SYSTEM: &str = "postgresql";

/// Span names for database operations.
pub mod span_names {
    /// Span name for connection establishment.
    pub const CONNECT: &str = "pg.connect";
    /// Span name for query execution.
    pub const QUERY: &str = "pg.query";
    /// Span name for command execution.
    pub const EXECUTE: &str = "pg.execute";
    /// Span name for statement preparation.
    pub const PREPARE: &str = "pg.prepare";
    /// Span name for beginning a transaction.
    pub const BEGIN_TRANSACTION: &str = "pg.begin_transaction";
    /// Span name for committing or rolling back a transaction.
    pub const END_TRANSACTION: &str = "pg.end_transaction";
    /// Span name for the liveness probe.
    pub const PING: &str = "pg.ping";
}

/// Attribute keys following OpenTelemetry semantic conventions.
pub mod attributes {
    /// Database system type.
    pub const DB_SYSTEM: &str = "db.system";
    /// Database name.
    pub const DB_NAME: &str = "db.name";
    /// SQL statement (may be sanitized).
    pub const DB_STATEMENT: &str = "db.statement";
    /// Database operation type.
    pub const DB_OPERATION: &str = "db.operation";
    /// Server hostname.
    pub const SERVER_ADDRESS: &str = "server.address";
    /// Server port.
    pub const SERVER_PORT: &str = "server.port";
    /// Number of rows affected.
    pub const DB_ROWS_AFFECTED: &str = "db.rows_affected";
    /// Backend process ID of the session.
    pub const DB_PROCESS_ID: &str = "db.postgresql.process_id";
}

/// Configuration for SQL statement sanitization.
#[derive(Debug, Clone)]
pub struct SanitizationConfig {
    /// Whether to sanitize SQL statements.
    pub enabled: bool,
    /// Maximum length of statement to record.
    pub max_length: usize,
    /// Placeholder to use for sanitized values.
    pub placeholder: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: 2048,
            placeholder: "?".to_string(),
        }
    }
}

impl SanitizationConfig {
    /// Create a configuration that doesn't sanitize statements.
    #[must_use]
    pub fn no_sanitization() -> Self {
        Self {
            enabled: false,
            max_length: usize::MAX,
            placeholder: String::new(),
        }
    }

    /// Sanitize a SQL statement according to the configuration.
    #[must_use]
    pub fn sanitize(&self, sql: &str) -> String {
        if !self.enabled {
            return truncate_string(sql, self.max_length);
        }
        truncate_string(&sanitize_sql(sql, &self.placeholder), self.max_length)
    }
}

/// Replace string and numeric literals with a placeholder.
///
/// Positional parameters (`$1`) are left alone; they carry no data.
fn sanitize_sql(sql: &str, placeholder: &str) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    continue;
                }
                in_string = false;
                result.push_str(placeholder);
            }
            continue;
        }

        if c == '\'' {
            in_string = true;
            continue;
        }

        if c.is_ascii_digit()
            && !result.ends_with(|ch: char| ch.is_alphanumeric() || ch == '_' || ch == '$')
        {
            while chars
                .peek()
                .is_some_and(|ch| ch.is_ascii_digit() || *ch == '.')
            {
                chars.next();
            }
            result.push_str(placeholder);
            continue;
        }

        result.push(c);
    }

    if in_string {
        result.push_str(placeholder);
    }

    result
}

/// Truncate a string to at most `max_len` bytes on a char boundary.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Extract the operation type from a SQL statement.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    let keyword = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();

    match keyword.as_str() {
        "SELECT" | "WITH" | "VALUES" | "TABLE" => "SELECT",
        "INSERT" => "INSERT",
        "UPDATE" => "UPDATE",
        "DELETE" => "DELETE",
        "MERGE" => "MERGE",
        "BEGIN" | "START" => "BEGIN",
        "COMMIT" | "END" => "COMMIT",
        "ROLLBACK" | "ABORT" => "ROLLBACK",
        "CREATE" => "CREATE",
        "ALTER" => "ALTER",
        "DROP" => "DROP",
        _ => "OTHER",
    }
}

/// Per-connection span factory.
#[derive(Debug, Clone)]
pub struct InstrumentationContext {
    /// Server address.
    pub server_address: String,
    /// Server port.
    pub server_port: u16,
    /// Database name.
    pub database: Option<String>,
    /// Sanitization configuration.
    pub sanitization: SanitizationConfig,
}

impl InstrumentationContext {
    /// Create a new instrumentation context.
    #[must_use]
    pub fn new(server_address: String, server_port: u16) -> Self {
        Self {
            server_address,
            server_port,
            database: None,
            sanitization: SanitizationConfig::default(),
        }
    }

    /// Set the database name.
    #[must_use]
    pub fn with_database(mut self, database: Option<String>) -> Self {
        self.database = database;
        self
    }

    /// Set the sanitization configuration.
    #[must_use]
    pub fn with_sanitization(mut self, config: SanitizationConfig) -> Self {
        self.sanitization = config;
        self
    }

    /// Span for connection establishment.
    pub fn connection_span(&self) -> Span {
        tracing::info_span!(
            span_names::CONNECT,
            db.system = DB_SYSTEM,
            db.name = self.database.as_deref().unwrap_or(""),
            server.address = self.server_address.as_str(),
            server.port = self.server_port,
        )
    }

    /// Span for a statement; `name` is one of [`span_names`].
    pub fn statement_span(&self, name: &'static str, sql: &str, process_id: i32) -> Span {
        let operation = extract_operation(sql);
        let statement = self.sanitization.sanitize(sql);
        macro_rules! span {
            ($name:expr) => {
                tracing::debug_span!(
                    $name,
                    db.system = DB_SYSTEM,
                    db.name = self.database.as_deref().unwrap_or(""),
                    db.operation = operation,
                    db.statement = statement.as_str(),
                    db.rows_affected = tracing::field::Empty,
                    db.postgresql.process_id = process_id,
                    server.address = self.server_address.as_str(),
                    server.port = self.server_port,
                )
            };
        }
        match name {
            span_names::EXECUTE => span!(span_names::EXECUTE),
            span_names::PREPARE => span!(span_names::PREPARE),
            span_names::BEGIN_TRANSACTION => span!(span_names::BEGIN_TRANSACTION),
            span_names::END_TRANSACTION => span!(span_names::END_TRANSACTION),
            span_names::PING => span!(span_names::PING),
            _ => span!(span_names::QUERY),
        }
    }

    /// Record the affected row count on a statement span.
    pub fn record_rows_affected(span: &Span, rows: u64) {
        span.record(attributes::DB_ROWS_AFFECTED, rows);
    }
}
