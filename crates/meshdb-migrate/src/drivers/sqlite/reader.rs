//! SQLite source reader.
//!
//! Uses SQLx with a single read-only connection. Values are decoded by their
//! runtime storage class, not the declared column type, since SQLite lets any
//! column hold any class.

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::SourceLocator;
use crate::core::{RowBatches, RowSource, SourceColumn, SqlValue, TableRow, READ_AHEAD_BATCHES};
use crate::error::{MigrateError, Result};

/// Read-only SQLite source.
pub struct SqliteSource {
    pool: SqlitePool,
}

impl SqliteSource {
    /// Open the file read-only and verify it with a round-trip query.
    pub async fn connect(locator: &SourceLocator) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(locator.path())
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::connection(e, format!("opening SQLite source {}", locator)))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::connection(e, "testing SQLite source connection"))?;

        info!("Connected to SQLite source: {}", locator);
        Ok(Self { pool })
    }

    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Stream `sql` into `tx` in batches. Stops quietly once the receiver is
    /// gone.
    async fn stream_rows(
        pool: SqlitePool,
        sql: String,
        batch_size: usize,
        tx: mpsc::Sender<Result<Vec<TableRow>>>,
    ) -> Result<()> {
        let mut rows = sqlx::query(&sql).fetch(&pool);
        let mut batch = Vec::with_capacity(batch_size);
        let mut total = 0usize;

        while let Some(row) = rows.try_next().await? {
            batch.push(Self::row_to_table_row(&row)?);
            if batch.len() >= batch_size {
                total += batch.len();
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                if tx.send(Ok(full)).await.is_err() {
                    return Ok(());
                }
            }
        }

        total += batch.len();
        if !batch.is_empty() {
            let _ = tx.send(Ok(batch)).await;
        }
        debug!("Streamed {} rows: {}", total, sql);
        Ok(())
    }

    fn row_to_table_row(row: &SqliteRow) -> Result<TableRow> {
        let mut out = TableRow::with_capacity(row.len());
        for (i, column) in row.columns().iter().enumerate() {
            out.insert(column.name(), Self::decode(row, i)?);
        }
        Ok(out)
    }

    fn decode(row: &SqliteRow, i: usize) -> Result<SqlValue> {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let storage_class = raw.type_info().name().to_uppercase();

        let value = match storage_class.as_str() {
            "INTEGER" | "INT" | "BIGINT" | "INT8" | "BOOLEAN" => {
                SqlValue::Int(row.try_get_unchecked::<i64, _>(i)?)
            }
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                SqlValue::Float(row.try_get_unchecked::<f64, _>(i)?)
            }
            "BLOB" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
            _ => match row.try_get_unchecked::<String, _>(i) {
                Ok(s) => SqlValue::Text(s),
                Err(_) => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
            },
        };
        Ok(value)
    }
}

#[async_trait]
impl RowSource for SqliteSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        debug!("Source has {} tables", tables.len());
        Ok(tables)
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", Self::quote_ident(table));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    fn read_table(&self, table: &str, batch_size: usize) -> RowBatches {
        let (tx, rx) = mpsc::channel(READ_AHEAD_BATCHES);
        let pool = self.pool.clone();
        let sql = format!("SELECT * FROM {}", Self::quote_ident(table));
        let batch_size = batch_size.max(1);

        tokio::spawn(async move {
            if let Err(e) = Self::stream_rows(pool, sql, batch_size, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<SourceColumn>> {
        let sql = format!("PRAGMA table_info({})", Self::quote_ident(table));
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok(SourceColumn {
                    name: row.try_get::<String, _>("name")?,
                    declared_type: row.try_get::<String, _>("type")?,
                    not_null: row.try_get::<i64, _>("notnull")? != 0,
                    pk_position: row.try_get::<i64, _>("pk")? as i32,
                })
            })
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use sqlx::{ConnectOptions, Connection};

    use super::*;

    async fn fixture(path: &Path) {
        let mut conn = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE nodes (nodeNum INTEGER PRIMARY KEY, longName TEXT NOT NULL, snr REAL, raw BLOB)",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        sqlx::query("CREATE TABLE channels (id INTEGER, name VARCHAR(64), misc, PRIMARY KEY (id))")
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::query("INSERT INTO nodes VALUES (1, 'alpha', 4.5, x'0102'), (2, 'beta', NULL, NULL)")
            .execute(&mut conn)
            .await
            .unwrap();
        // Untyped columns keep whatever storage class was inserted.
        sqlx::query("INSERT INTO channels VALUES (0, 'Primary', 'text'), (1, 'Secondary', 42)")
            .execute(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();
    }

    async fn read_all(source: &SqliteSource, table: &str, batch_size: usize) -> Vec<Vec<TableRow>> {
        let mut batches = source.read_table(table, batch_size);
        let mut out = Vec::new();
        while let Some(batch) = batches.recv().await {
            out.push(batch.unwrap());
        }
        out
    }

    async fn open(dir: &tempfile::TempDir) -> SqliteSource {
        let path = dir.path().join("source.db");
        fixture(&path).await;
        let locator: SourceLocator = path.to_str().unwrap().parse().unwrap();
        SqliteSource::connect(&locator).await.unwrap()
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let source = open(&dir).await;

        assert_eq!(source.list_tables().await.unwrap(), vec!["nodes", "channels"]);
        assert_eq!(source.count_rows("nodes").await.unwrap(), 2);
        assert!(source.count_rows("missing").await.is_err());
        source.close().await;
    }

    #[tokio::test]
    async fn test_read_decodes_storage_classes() {
        let dir = tempfile::tempdir().unwrap();
        let source = open(&dir).await;

        let rows = read_all(&source, "nodes", 100).await.concat();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("nodeNum"), Some(&SqlValue::Int(1)));
        assert_eq!(rows[0].get("longName"), Some(&SqlValue::from("alpha")));
        assert_eq!(rows[0].get("snr"), Some(&SqlValue::Float(4.5)));
        assert_eq!(rows[0].get("raw"), Some(&SqlValue::Bytes(vec![1, 2])));
        assert_eq!(rows[1].get("snr"), Some(&SqlValue::Null));
        assert_eq!(
            rows[0].column_names().collect::<Vec<_>>(),
            vec!["nodeNum", "longName", "snr", "raw"]
        );

        let channels = read_all(&source, "channels", 100).await.concat();
        assert_eq!(channels[0].get("misc"), Some(&SqlValue::from("text")));
        assert_eq!(channels[1].get("misc"), Some(&SqlValue::Int(42)));
        source.close().await;
    }

    #[tokio::test]
    async fn test_read_splits_into_batches() {
        let dir = tempfile::tempdir().unwrap();
        let source = open(&dir).await;

        let batches = read_all(&source, "nodes", 1).await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0][0].get("nodeNum"), Some(&SqlValue::Int(1)));
        assert_eq!(batches[1][0].get("nodeNum"), Some(&SqlValue::Int(2)));
        source.close().await;
    }

    #[tokio::test]
    async fn test_read_missing_table_yields_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = open(&dir).await;

        let mut batches = source.read_table("missing", 10);
        assert!(batches.recv().await.unwrap().is_err());
        assert!(batches.recv().await.is_none());
        source.close().await;
    }

    #[tokio::test]
    async fn test_table_columns() {
        let dir = tempfile::tempdir().unwrap();
        let source = open(&dir).await;

        let cols = source.table_columns("nodes").await.unwrap();
        assert_eq!(cols.len(), 4);
        assert_eq!(cols[0].name, "nodeNum");
        assert!(cols[0].is_primary_key());
        assert!(cols[1].not_null);
        assert_eq!(cols[2].declared_type, "REAL");
        source.close().await;
    }

    #[tokio::test]
    async fn test_source_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let source = open(&dir).await;

        let result = sqlx::query("DELETE FROM nodes").execute(&source.pool).await;
        assert!(result.is_err());
        assert_eq!(source.count_rows("nodes").await.unwrap(), 2);
        source.close().await;
    }

    #[tokio::test]
    async fn test_missing_file_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let locator: SourceLocator = dir
            .path()
            .join("absent.db")
            .to_str()
            .unwrap()
            .parse()
            .unwrap();

        let err = SqliteSource::connect(&locator).await.err().unwrap();
        assert!(matches!(err, MigrateError::Connection { .. }));
    }
}
