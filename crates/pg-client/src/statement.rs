//! Server-side prepared statements.

use std::sync::Arc;

use crate::row::Column;

/// A named statement prepared with [`Client::prepare`](crate::Client::prepare).
///
/// Executions go through
/// [`Client::query_statement`](crate::Client::query_statement) and
/// [`Client::execute_statement`](crate::Client::execute_statement), which
/// arm a statement-scoped watcher: cancelling their context aborts the
/// execution on the server without invalidating the connection.
///
/// The statement lives on the connection that prepared it until
/// [`Client::close_statement`](crate::Client::close_statement) or the
/// session ends.
#[derive(Debug, Clone)]
pub struct Statement {
    name: String,
    sql: String,
    param_types: Vec<u32>,
    columns: Arc<[Column]>,
}

impl Statement {
    pub(crate) fn new(
        name: String,
        sql: String,
        param_types: Vec<u32>,
        columns: Arc<[Column]>,
    ) -> Self {
        Self {
            name,
            sql,
            param_types,
            columns,
        }
    }

    /// Server-side statement name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The SQL text the statement was prepared from.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameter type OIDs as resolved by the server.
    #[must_use]
    pub fn param_types(&self) -> &[u32] {
        &self.param_types
    }

    /// Result columns, empty for statements that return no rows.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn shared_columns(&self) -> Arc<[Column]> {
        Arc::clone(&self.columns)
    }
}
