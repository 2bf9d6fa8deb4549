//! In-memory source and target used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::{
    first_rows, ColumnCatalog, ColumnType, LoadReport, RowBatches, RowOutcome, RowSource,
    SourceColumn, SqlValue, TableRow, TargetEngine, TargetLoader, READ_AHEAD_BATCHES,
};
use crate::error::{MigrateError, Result};

/// A [`RowSource`] over tables held in memory. Records every table it is
/// asked about.
#[derive(Default)]
pub(crate) struct MemorySource {
    tables: Vec<(String, Vec<SourceColumn>, Vec<TableRow>)>,
    unreadable: Vec<String>,
    broken_streams: HashMap<String, usize>,
    queried: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MemorySource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_table(
        mut self,
        name: &str,
        columns: Vec<SourceColumn>,
        rows: Vec<TableRow>,
    ) -> Self {
        self.tables.push((name.to_string(), columns, rows));
        self
    }

    /// List the table but fail every read of it.
    pub(crate) fn with_unreadable(mut self, name: &str) -> Self {
        self.unreadable.push(name.to_string());
        self
    }

    /// Count the table normally but fail its stream after `rows` rows.
    pub(crate) fn with_broken_stream(mut self, name: &str, rows: usize) -> Self {
        self.broken_streams.insert(name.to_string(), rows);
        self
    }

    pub(crate) fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn table(&self, name: &str) -> Result<&(String, Vec<SourceColumn>, Vec<TableRow>)> {
        self.queried.lock().unwrap().push(name.to_string());
        if self.unreadable.iter().any(|t| t == name) {
            return Err(MigrateError::Schema(format!("no such table: {}", name)));
        }
        self.tables
            .iter()
            .find(|(t, _, _)| t == name)
            .ok_or_else(|| MigrateError::Schema(format!("no such table: {}", name)))
    }
}

#[async_trait]
impl RowSource for MemorySource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self
            .tables
            .iter()
            .map(|(t, _, _)| t.clone())
            .chain(self.unreadable.iter().cloned())
            .collect())
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        Ok(self.table(table)?.2.len() as u64)
    }

    fn read_table(&self, table: &str, batch_size: usize) -> RowBatches {
        let (tx, rx) = mpsc::channel(READ_AHEAD_BATCHES);
        let broken_after = self.broken_streams.get(table).copied();
        let rows = self.table(table).map(|(_, _, rows)| match broken_after {
            Some(n) => rows[..n.min(rows.len())].to_vec(),
            None => rows.clone(),
        });

        tokio::spawn(async move {
            let rows = match rows {
                Ok(rows) => rows,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            for batch in rows.chunks(batch_size.max(1)) {
                if tx.send(Ok(batch.to_vec())).await.is_err() {
                    return;
                }
            }
            if broken_after.is_some() {
                let err = MigrateError::Schema("database disk image is malformed".into());
                let _ = tx.send(Err(err)).await;
            }
        });
        rx
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<SourceColumn>> {
        Ok(self.table(table)?.1.clone())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MemoryTable {
    catalog: ColumnCatalog,
    key: String,
    foreign_key: Option<(String, String, String)>,
    identity: Option<String>,
    next_id: i64,
    rows: Vec<TableRow>,
}

/// Table and column of a generated key in a derived CREATE TABLE statement.
fn declared_identity(statement: &str) -> Option<(String, String)> {
    let unquote = |s: &str| s.trim_matches(|c| c == '"' || c == '`').to_string();
    let table = statement
        .strip_prefix("CREATE TABLE IF NOT EXISTS ")?
        .split_whitespace()
        .next()?;
    let line = statement
        .lines()
        .find(|l| l.contains("BIGSERIAL") || l.contains("AUTO_INCREMENT"))?;
    let column = line.split_whitespace().next()?;
    Some((unquote(table), unquote(column)))
}

/// A [`TargetLoader`] that enforces primary-key uniqueness (first column of
/// each table) and declared foreign keys. Accepted DDL that declares a
/// generated key gives the table an identity generator.
pub(crate) struct MemoryLoader {
    engine: TargetEngine,
    refuse_ddl: Option<String>,
    fail_loads: Option<String>,
    tables: Mutex<HashMap<String, MemoryTable>>,
    ddl: Mutex<Vec<String>>,
    load_calls: Mutex<Vec<String>>,
    batches: Mutex<HashMap<String, usize>>,
    closed: AtomicBool,
}

impl MemoryLoader {
    pub(crate) fn new(engine: TargetEngine) -> Self {
        Self {
            engine,
            refuse_ddl: None,
            fail_loads: None,
            tables: Mutex::new(HashMap::new()),
            ddl: Mutex::new(Vec::new()),
            load_calls: Mutex::new(Vec::new()),
            batches: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_table(self, name: &str, columns: &[(&str, ColumnType)]) -> Self {
        let catalog = columns
            .iter()
            .fold(ColumnCatalog::new(name), |c, (col, ty)| c.with(col, *ty));
        let table = MemoryTable {
            catalog,
            key: columns.first().map(|(c, _)| c.to_string()).unwrap_or_default(),
            foreign_key: None,
            identity: None,
            next_id: 1,
            rows: Vec::new(),
        };
        self.tables.lock().unwrap().insert(name.to_string(), table);
        self
    }

    pub(crate) fn with_foreign_key(self, table: &str, column: &str, parent: &str, parent_column: &str) -> Self {
        if let Some(t) = self.tables.lock().unwrap().get_mut(table) {
            t.foreign_key = Some((column.into(), parent.into(), parent_column.into()));
        }
        self
    }

    pub(crate) fn with_identity(self, table: &str, column: &str) -> Self {
        if let Some(t) = self.tables.lock().unwrap().get_mut(table) {
            t.identity = Some(column.into());
        }
        self
    }

    /// Refuse any DDL statement containing `marker`.
    pub(crate) fn refuse_ddl_containing(mut self, marker: &str) -> Self {
        self.refuse_ddl = Some(marker.into());
        self
    }

    /// Fail loads into `table` as if the connection dropped.
    pub(crate) fn fail_loads_for(mut self, table: &str) -> Self {
        self.fail_loads = Some(table.into());
        self
    }

    pub(crate) fn rows(&self, table: &str) -> Vec<TableRow> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Accepted DDL statements.
    pub(crate) fn ddl(&self) -> Vec<String> {
        self.ddl.lock().unwrap().clone()
    }

    /// Tables `load_table` was called for with at least one row.
    pub(crate) fn load_calls(&self) -> Vec<String> {
        self.load_calls.lock().unwrap().clone()
    }

    /// Non-empty batches received for `table`.
    pub(crate) fn batches_received(&self, table: &str) -> usize {
        self.batches.lock().unwrap().get(table).copied().unwrap_or(0)
    }

    /// Next value the identity generator of `table` would hand out.
    pub(crate) fn next_identity(&self, table: &str) -> Option<i64> {
        let tables = self.tables.lock().unwrap();
        let t = tables.get(table)?;
        t.identity.as_ref().map(|_| t.next_id)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetLoader for MemoryLoader {
    fn engine(&self) -> TargetEngine {
        self.engine
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        if let Some(marker) = &self.refuse_ddl {
            if statement.contains(marker.as_str()) {
                return Err(MigrateError::Schema(format!("refused: {}", statement)));
            }
        }
        if let Some((table, column)) = declared_identity(statement) {
            if let Some(t) = self.tables.lock().unwrap().get_mut(&table) {
                t.identity = Some(column);
            }
        }
        self.ddl.lock().unwrap().push(statement.to_string());
        Ok(())
    }

    async fn column_catalog(&self, table: &str) -> Result<ColumnCatalog> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.catalog.clone())
            .unwrap_or_else(|| ColumnCatalog::new(table)))
    }

    async fn load_table(&self, table: &str, mut batches: RowBatches) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let Some(mut rows) = first_rows(&mut batches).await? else {
            return Ok(report);
        };
        self.load_calls.lock().unwrap().push(table.to_string());
        if self.fail_loads.as_deref() == Some(table) {
            return Err(MigrateError::load(table, "connection reset by peer"));
        }

        // Nothing is applied until the stream ends cleanly, like a commit.
        let mut received = 1;
        while let Some(batch) = batches.recv().await.transpose()? {
            if !batch.is_empty() {
                received += 1;
            }
            rows.extend(batch);
        }
        *self.batches.lock().unwrap().entry(table.to_string()).or_default() += received;

        let mut tables = self.tables.lock().unwrap();
        let parent_values: Option<(String, Vec<SqlValue>)> = tables
            .get(table)
            .and_then(|t| t.foreign_key.clone())
            .map(|(column, parent, parent_column)| {
                let values = tables
                    .get(&parent)
                    .map(|p| {
                        p.rows
                            .iter()
                            .filter_map(|r| r.get(&parent_column).cloned())
                            .collect()
                    })
                    .unwrap_or_default();
                (column, values)
            });

        let Some(target) = tables.get_mut(table) else {
            for _ in &rows {
                report.record(RowOutcome::Rejected(format!("relation {} does not exist", table)));
            }
            return Ok(report);
        };

        for row in rows {
            let key = row.get(&target.key).cloned().unwrap_or(SqlValue::Null);
            let duplicate = !key.is_null()
                && target.rows.iter().any(|r| r.get(&target.key) == Some(&key));

            let orphan = parent_values.as_ref().and_then(|(column, parents)| {
                row.get(column)
                    .filter(|v| !v.is_null() && !parents.contains(*v))
                    .map(|v| format!("foreign key violation: {} = {} has no parent", column, v))
            });

            let outcome = if duplicate {
                RowOutcome::Conflict
            } else if let Some(reason) = orphan {
                RowOutcome::Rejected(reason)
            } else {
                target.rows.push(row);
                RowOutcome::Applied
            };
            report.record(outcome);
        }
        Ok(report)
    }

    async fn resync_sequence(&self, table: &str, column: &str) -> Result<i64> {
        let mut tables = self.tables.lock().unwrap();
        let t = tables
            .get_mut(table)
            .filter(|t| t.identity.as_deref() == Some(column))
            .ok_or_else(|| MigrateError::Schema(format!("{}.{} has no sequence", table, column)))?;
        let max = t
            .rows
            .iter()
            .filter_map(|r| r.get(column).and_then(SqlValue::as_i64))
            .max()
            .unwrap_or(0);
        t.next_id = max + 1;
        Ok(t.next_id)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
