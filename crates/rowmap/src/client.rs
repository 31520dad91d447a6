//! Executor boundary.
//!
//! The mapping engine does not talk to a database itself. It consumes an
//! [`Executor`] (a connection, a pooled client, a transaction) that runs
//! statements and hands back a [`RowCursor`] over the result.

use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use std::future::Future;

/// Outcome reported by the executor for a non-query statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows affected by the statement.
    pub rows_affected: u64,
    /// Identifier generated by the statement, when the engine reports one.
    pub last_insert_id: Option<i64>,
}

impl ExecOutcome {
    pub fn new(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            last_insert_id: None,
        }
    }

    pub fn with_last_insert_id(mut self, id: i64) -> Self {
        self.last_insert_id = Some(id);
        self
    }
}

/// Something that receives one scanned column value.
pub trait ScanTarget {
    fn scan(&mut self, raw: Value) -> OrmResult<()>;
}

/// A scan target that drops the value.
///
/// Cursors require one target per column; unmapped columns scan into this.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl ScanTarget for Discard {
    fn scan(&mut self, _raw: Value) -> OrmResult<()> {
        Ok(())
    }
}

/// Forward-only iteration over a result set.
///
/// Rows are already fetched by the time a cursor is handed out, so none of
/// these methods suspend.
pub trait RowCursor: Send {
    /// Column names, in result order.
    fn columns(&self) -> &[String];

    /// Advance to the next row. Returns `false` when the result is exhausted.
    fn next(&mut self) -> OrmResult<bool>;

    /// Scan the current row into `targets`, one target per column.
    fn scan(&mut self, targets: &mut [&mut dyn ScanTarget]) -> OrmResult<()>;

    /// Release the cursor. Later calls to `next` return `false`.
    fn close(&mut self) -> OrmResult<()> {
        Ok(())
    }
}

/// Check the target count matches the column count before scanning.
pub fn check_scan_arity(columns: usize, targets: usize) -> OrmResult<()> {
    if columns != targets {
        return Err(OrmError::validation(format!(
            "expected {columns} scan targets, got {targets}"
        )));
    }
    Ok(())
}

/// A trait that unifies connections, pooled clients and transactions.
///
/// Every mapping operation on [`crate::Db`] runs through this trait, so the
/// same code works directly on a client or inside a transaction.
pub trait Executor: Send + Sync {
    /// Cursor type returned by queries.
    type Cursor: RowCursor;

    /// Prepared statement handle.
    type Statement: Send + Sync;

    /// Execute a statement and report its outcome.
    fn execute(
        &self,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = OrmResult<ExecOutcome>> + Send;

    /// Run a query and return a cursor over its rows.
    fn query(
        &self,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = OrmResult<Self::Cursor>> + Send;

    /// Prepare a statement on this executor.
    ///
    /// Prepared statements are tied to the executor that prepared them.
    fn prepare(&self, sql: &str) -> impl Future<Output = OrmResult<Self::Statement>> + Send;

    /// Execute a prepared statement.
    fn execute_prepared(
        &self,
        stmt: &Self::Statement,
        args: &[Value],
    ) -> impl Future<Output = OrmResult<ExecOutcome>> + Send;

    /// Run a prepared query.
    fn query_prepared(
        &self,
        stmt: &Self::Statement,
        args: &[Value],
    ) -> impl Future<Output = OrmResult<Self::Cursor>> + Send;
}

impl<E: Executor> Executor for &E {
    type Cursor = E::Cursor;
    type Statement = E::Statement;

    fn execute(
        &self,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = OrmResult<ExecOutcome>> + Send {
        (**self).execute(sql, args)
    }

    fn query(
        &self,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = OrmResult<Self::Cursor>> + Send {
        (**self).query(sql, args)
    }

    fn prepare(&self, sql: &str) -> impl Future<Output = OrmResult<Self::Statement>> + Send {
        (**self).prepare(sql)
    }

    fn execute_prepared(
        &self,
        stmt: &Self::Statement,
        args: &[Value],
    ) -> impl Future<Output = OrmResult<ExecOutcome>> + Send {
        (**self).execute_prepared(stmt, args)
    }

    fn query_prepared(
        &self,
        stmt: &Self::Statement,
        args: &[Value],
    ) -> impl Future<Output = OrmResult<Self::Cursor>> + Send {
        (**self).query_prepared(stmt, args)
    }
}
