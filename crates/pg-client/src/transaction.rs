//! Transaction support.
//!
//! This module provides transaction isolation levels, the options passed to
//! [`Client::begin_tx`](crate::Client::begin_tx), and the [`Transaction`]
//! handle.

use pg_protocol::TransactionStatus;
use pg_types::ToSql;

use crate::client::Client;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::row::Row;
use crate::watcher::{CancelWatch, WatchScope};

/// Transaction isolation level.
///
/// The numbering follows the common database-API convention so levels can
/// be passed through from generic front ends with [`IsolationLevel::from_i32`].
/// Only a subset has a PostgreSQL spelling; the rest are rejected by
/// [`TxOptions::mode_clause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Use the server's default (`default_transaction_isolation`).
    #[default]
    Default,
    /// Read uncommitted. PostgreSQL runs this as read committed.
    ReadUncommitted,
    /// Read committed.
    ReadCommitted,
    /// Write committed. Not supported by PostgreSQL.
    WriteCommitted,
    /// Repeatable read.
    RepeatableRead,
    /// Snapshot. Not supported by PostgreSQL under this name.
    Snapshot,
    /// Serializable.
    Serializable,
    /// Linearizable. Not supported by PostgreSQL.
    Linearizable,
    /// Any other numeric level. A number in `0..=7` behaves exactly like
    /// the named variant [`IsolationLevel::from_i32`] returns for it.
    Other(i32),
}

impl IsolationLevel {
    /// Map a numeric level onto the enum.
    #[must_use]
    pub fn from_i32(level: i32) -> Self {
        match level {
            0 => Self::Default,
            1 => Self::ReadUncommitted,
            2 => Self::ReadCommitted,
            3 => Self::WriteCommitted,
            4 => Self::RepeatableRead,
            5 => Self::Snapshot,
            6 => Self::Serializable,
            7 => Self::Linearizable,
            other => Self::Other(other),
        }
    }

    /// The numeric level.
    #[must_use]
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Default => 0,
            Self::ReadUncommitted => 1,
            Self::ReadCommitted => 2,
            Self::WriteCommitted => 3,
            Self::RepeatableRead => 4,
            Self::Snapshot => 5,
            Self::Serializable => 6,
            Self::Linearizable => 7,
            Self::Other(n) => *n,
        }
    }

    /// The PostgreSQL name, or `None` for the server default and for levels
    /// PostgreSQL does not have.
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::ReadUncommitted => Some("READ UNCOMMITTED"),
            Self::ReadCommitted => Some("READ COMMITTED"),
            Self::RepeatableRead => Some("REPEATABLE READ"),
            Self::Serializable => Some("SERIALIZABLE"),
            _ => None,
        }
    }
}

/// Options for [`Client::begin_tx`](crate::Client::begin_tx).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    /// Isolation level.
    pub isolation: IsolationLevel,
    /// Whether the transaction is read-only.
    pub read_only: bool,
}

impl TxOptions {
    /// Default isolation, read-write.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    #[must_use]
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    /// Set read-only mode.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// The text appended to `BEGIN`, with a leading space.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedIsolationLevel`] naming the numeric level when
    /// PostgreSQL has no equivalent.
    pub fn mode_clause(&self) -> Result<String> {
        let mut mode = match IsolationLevel::from_i32(self.isolation.as_i32()) {
            IsolationLevel::Default => String::new(),
            level => match level.name() {
                Some(name) => format!(" ISOLATION LEVEL {name}"),
                None => return Err(Error::UnsupportedIsolationLevel(level.as_i32())),
            },
        };
        mode.push_str(if self.read_only {
            " READ ONLY"
        } else {
            " READ WRITE"
        });
        Ok(mode)
    }
}

/// An open transaction.
///
/// Borrows the client mutably, so nothing else runs on the connection until
/// the transaction ends. Dropping it without [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) schedules a `ROLLBACK` that runs ahead of
/// the client's next operation.
///
/// The context given to [`Client::begin_tx`] is watched for the lifetime of
/// the transaction. If it is done first, the connection is marked bad and
/// the server is asked to cancel whatever the session is running.
pub struct Transaction<'a> {
    client: &'a mut Client,
    options: TxOptions,
    watch: Option<CancelWatch>,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(
        client: &'a mut Client,
        options: TxOptions,
        watch: Option<CancelWatch>,
    ) -> Self {
        Self {
            client,
            options,
            watch,
            finished: false,
        }
    }

    /// The options this transaction was started with.
    #[must_use]
    pub fn options(&self) -> TxOptions {
        self.options
    }

    /// Run a query inside the transaction.
    pub async fn query(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>> {
        self.client.query(ctx, sql, params).await
    }

    /// Run a statement inside the transaction and return rows affected.
    pub async fn execute(
        &mut self,
        ctx: &Context,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64> {
        self.client.execute(ctx, sql, params).await
    }

    /// Commit the transaction.
    ///
    /// Committing a transaction that already failed rolls it back and
    /// returns [`Error::Transaction`]. If the transaction's context was
    /// done first, nothing is sent and [`Error::Cancelled`] is returned.
    pub async fn commit(mut self, ctx: &Context) -> Result<()> {
        self.finished = true;
        self.release_watch().await?;

        if self.client.transaction_status() == TransactionStatus::Failed {
            self.client.end_transaction(ctx, "ROLLBACK").await?;
            return Err(Error::Transaction(
                "transaction failed and was rolled back".into(),
            ));
        }

        let tag = self.client.end_transaction(ctx, "COMMIT").await?;
        if tag != "COMMIT" {
            self.client.mark_bad();
            return Err(Error::Transaction(format!(
                "unexpected command tag {tag}"
            )));
        }
        Ok(())
    }

    /// Roll the transaction back.
    pub async fn rollback(mut self, ctx: &Context) -> Result<()> {
        self.finished = true;
        self.release_watch().await?;
        self.client.end_transaction(ctx, "ROLLBACK").await?;
        Ok(())
    }

    async fn release_watch(&mut self) -> Result<()> {
        let watch = self.watch.take();
        self.client
            .resolve_watch(watch, WatchScope::Connection)
            .await
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("options", &self.options)
            .field("watched", &self.watch.is_some())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        // Dropping the watch resolves its race without a cancel request.
        self.watch = None;
        if !self.finished {
            tracing::warn!("transaction dropped without commit or rollback; scheduling ROLLBACK");
            self.client.schedule_rollback();
        }
    }
}
