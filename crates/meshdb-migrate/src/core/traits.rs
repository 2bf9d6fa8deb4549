//! Core traits for the migration pipeline.
//!
//! - [`RowSource`]: read-only access to the origin store
//! - [`TargetLoader`]: catalog introspection, DDL, conflict-tolerant loading and
//!   sequence resynchronization for one target engine family
//! - [`Dialect`]: SQL syntax strategy for a target engine

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

use super::schema::{ColumnCatalog, SourceColumn, TargetEngine};
use super::value::TableRow;

/// Rows of one table delivered in batches. The channel closes after the last
/// batch; an `Err` item ends the stream.
pub type RowBatches = mpsc::Receiver<Result<Vec<TableRow>>>;

/// Batches buffered between a reader and its consumer.
pub const READ_AHEAD_BATCHES: usize = 4;

/// Wait for the first batch holding at least one row.
///
/// Returns `None` when the stream ends without any rows.
pub async fn first_rows(batches: &mut RowBatches) -> Result<Option<Vec<TableRow>>> {
    while let Some(batch) = batches.recv().await {
        let rows = batch?;
        if !rows.is_empty() {
            return Ok(Some(rows));
        }
    }
    Ok(None)
}

/// Read-only cursor over the origin store.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Enumerate user tables in source order.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Count the rows of a table.
    async fn count_rows(&self, table: &str) -> Result<u64>;

    /// Start streaming the rows of a table.
    ///
    /// A background task fills the channel with batches of at most
    /// `batch_size` rows, so reading waits whenever the consumer falls behind.
    fn read_table(&self, table: &str, batch_size: usize) -> RowBatches;

    /// Column definitions of a table, used to derive target DDL.
    async fn table_columns(&self, table: &str) -> Result<Vec<SourceColumn>>;

    /// Release the connection.
    async fn close(&self);
}

/// Result of inserting a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// The row was written.
    Applied,
    /// The row collided with a uniqueness constraint and was skipped.
    Conflict,
    /// The engine refused the row (foreign key, bad value, ...).
    Rejected(String),
}

/// Per-table result of a [`TargetLoader::load_table`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Rows actually written.
    pub applied: u64,
    /// Rows skipped because they duplicated an existing key.
    pub conflicts: u64,
    /// Reasons for each rejected row, in row order.
    pub rejected: Vec<String>,
}

impl LoadReport {
    /// Fold one row outcome into the report.
    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Applied => self.applied += 1,
            RowOutcome::Conflict => self.conflicts += 1,
            RowOutcome::Rejected(reason) => self.rejected.push(reason),
        }
    }

    /// Number of rejected rows.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.len() as u64
    }
}

/// Write side of a migration for one target engine family.
///
/// Implementations hold exactly one connection (or single-connection pool)
/// for the duration of the run.
#[async_trait]
pub trait TargetLoader: Send + Sync {
    /// Engine family of this loader.
    fn engine(&self) -> TargetEngine;

    /// Execute one DDL statement.
    ///
    /// A statement the server refuses is reported as
    /// [`MigrateError::Schema`](crate::MigrateError::Schema); connectivity
    /// problems surface as driver errors.
    async fn execute_ddl(&self, statement: &str) -> Result<()>;

    /// Introspect the live catalog for a table. A missing table yields an
    /// empty catalog.
    async fn column_catalog(&self, table: &str) -> Result<ColumnCatalog>;

    /// Insert every batch, one row at a time, inside a single transaction.
    ///
    /// Uniqueness conflicts are skipped and other per-row refusals are recorded
    /// as rejections; neither undoes rows already applied. A connection-level
    /// failure, or an `Err` received from `batches`, rolls the table back and
    /// is returned as an error. A stream with no rows is a no-op that does not
    /// open a transaction.
    async fn load_table(&self, table: &str, batches: RowBatches) -> Result<LoadReport>;

    /// Advance the identity generator behind `table.column` past the largest
    /// value present. Returns the next value the generator will hand out.
    async fn resync_sequence(&self, table: &str, column: &str) -> Result<i64>;

    /// Release the connection.
    async fn close(&self);
}

/// SQL syntax strategy for a target engine.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier.
    fn name(&self) -> &str;

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> String;

    /// Parameter placeholder for the given 1-based index.
    fn param_placeholder(&self, index: usize) -> String;

    /// Build a single-row INSERT that skips rows violating a uniqueness
    /// constraint instead of failing.
    fn build_insert_ignore(&self, table: &str, columns: &[String]) -> String;

    /// Map a SQLite declared type onto a target column type.
    fn map_source_type(&self, declared_type: &str, is_primary_key: bool) -> String;

    /// Column definition for a single-column integer primary key that the
    /// engine should number itself.
    fn identity_column(&self, name: &str) -> String;

    /// Text appended after the closing parenthesis of CREATE TABLE.
    fn create_table_suffix(&self) -> &str {
        ""
    }
}
