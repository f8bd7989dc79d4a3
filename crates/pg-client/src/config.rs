//! Client configuration.
//!
//! Defaults are resolved when a [`Config`] is constructed; nothing here is
//! consulted after the connection is established except by the cancel
//! path, which reuses the dial target.

use std::time::Duration;

use pg_auth::Credentials;
use pg_tls::{SslMode, TlsConfig};

use crate::error::Error;

/// Default server port.
pub const DEFAULT_PORT: u16 = 5432;

/// Default initial capacity of the connection's read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

/// Default `application_name` reported to the server.
pub const DEFAULT_APPLICATION_NAME: &str = "pg-client";

/// Configuration for connecting to PostgreSQL.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future releases without breaking semver. Use [`Config::default()`],
/// [`Config::from_connection_string()`] or [`Config::from_env()`] to
/// construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 5432).
    pub port: u16,

    /// Database name. The server defaults it to the user name when unset.
    pub database: Option<String>,

    /// Authentication credentials.
    pub credentials: Credentials,

    /// Application name (shown in `pg_stat_activity`).
    pub application_name: String,

    /// SSL negotiation mode.
    pub ssl_mode: SslMode,

    /// TLS configuration used when TLS is negotiated.
    pub tls: TlsConfig,

    /// Time allowed for TCP connect.
    pub connect_timeout: Duration,

    /// Initial capacity of the framed transport's read buffer.
    pub min_read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: None,
            credentials: Credentials::without_password(default_user(|k| std::env::var(k).ok())),
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            ssl_mode: SslMode::default(),
            tls: TlsConfig::default(),
            connect_timeout: Duration::from_secs(15),
            min_read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// The current OS user, without any `DOMAIN\` prefix.
fn default_user(lookup: impl Fn(&str) -> Option<String>) -> String {
    let user = lookup("USER")
        .or_else(|| lookup("USERNAME"))
        .unwrap_or_default();
    match user.rsplit_once('\\') {
        Some((_domain, name)) => name.to_string(),
        None => user,
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a libpq keyword/value connection string.
    ///
    /// ```text
    /// host=localhost port=5432 user=app password='s3 cr\'et' dbname=app sslmode=disable
    /// ```
    ///
    /// Values may be single-quoted; inside quotes `\'` and `\\` are escapes.
    /// Unknown keywords are rejected.
    pub fn from_connection_string(conn_str: &str) -> Result<Self, Error> {
        let mut config = Self::default();
        let mut user = None;
        let mut password = None;

        for (key, value) in parse_pairs(conn_str)? {
            match key.as_str() {
                "host" => config.host = value,
                "port" => {
                    config.port = value
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid port: {value}")))?;
                }
                "user" => user = Some(value),
                "password" => password = Some(value),
                "dbname" => config.database = Some(value),
                "application_name" => config.application_name = value,
                "sslmode" => config.ssl_mode = value.parse()?,
                "connect_timeout" => {
                    let secs: u64 = value
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid connect_timeout: {value}")))?;
                    config.connect_timeout = Duration::from_secs(secs);
                }
                "min_read_buffer_size" => {
                    config.min_read_buffer_size = value.parse().map_err(|_| {
                        Error::Config(format!("invalid min_read_buffer_size: {value}"))
                    })?;
                }
                other => {
                    return Err(Error::Config(format!("unrecognized parameter: {other}")));
                }
            }
        }

        config.set_credentials(user, password);
        Ok(config)
    }

    /// Build a configuration from the standard `PG*` environment variables.
    ///
    /// Reads `PGHOST`, `PGPORT`, `PGUSER`, `PGPASSWORD`, `PGDATABASE`,
    /// `PGAPPNAME` and `PGSSLMODE`; anything unset keeps its default.
    pub fn from_env() -> Result<Self, Error> {
        Self::default().apply_env(|k| std::env::var(k).ok())
    }

    fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        if let Some(host) = lookup("PGHOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PGPORT") {
            self.port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid PGPORT: {port}")))?;
        }
        if let Some(db) = lookup("PGDATABASE") {
            self.database = Some(db);
        }
        if let Some(app) = lookup("PGAPPNAME") {
            self.application_name = app;
        }
        if let Some(mode) = lookup("PGSSLMODE") {
            self.ssl_mode = mode.parse()?;
        }
        self.set_credentials(lookup("PGUSER"), lookup("PGPASSWORD"));
        Ok(self)
    }

    fn set_credentials(&mut self, user: Option<String>, password: Option<String>) {
        let user = user.unwrap_or_else(|| self.credentials.user().to_string());
        let password = password.or_else(|| self.credentials.password().map(str::to_string));
        self.credentials = match password {
            Some(password) => Credentials::new(user, password),
            None => Credentials::without_password(user),
        };
    }

    /// Set the host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Set the SSL negotiation mode.
    #[must_use]
    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// Set the TLS configuration.
    #[must_use]
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Set the TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the initial read buffer capacity.
    #[must_use]
    pub fn min_read_buffer_size(mut self, size: usize) -> Self {
        self.min_read_buffer_size = size;
        self
    }
}

/// Split a keyword/value string into pairs.
fn parse_pairs(s: &str) -> Result<Vec<(String, String)>, Error> {
    let mut pairs = Vec::new();
    let mut chars = s.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            return Ok(pairs);
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(Error::Config(format!("missing \"=\" after \"{key}\"")));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\'') => break,
                    Some('\\') => match chars.next() {
                        Some(c) => value.push(c),
                        None => {
                            return Err(Error::Config("unterminated quoted value".into()));
                        }
                    },
                    Some(c) => value.push(c),
                    None => return Err(Error::Config("unterminated quoted value".into())),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        value.push(escaped);
                    }
                } else {
                    value.push(c);
                }
            }
        }

        pairs.push((key, value));
    }
}
