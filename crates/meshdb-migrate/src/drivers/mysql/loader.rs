//! MySQL/MariaDB target loader.
//!
//! Rows go in one at a time through `INSERT IGNORE` inside one transaction per
//! table. When a statement affects no row, `SHOW WARNINGS` tells a duplicate
//! key (skipped) apart from a refused row (rejected).

use std::collections::HashMap;

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, SslOpts, TxOpts};
use tracing::{debug, info, warn};

use super::catalog;
use super::MysqlDialect;
use crate::config::TargetLocator;
use crate::core::{
    first_rows, ColumnCatalog, Dialect, LoadReport, RowBatches, RowOutcome, SqlValue,
    TargetEngine, TargetLoader,
};
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// ER_DUP_ENTRY, reported as a warning under INSERT IGNORE.
const ER_DUP_ENTRY: u32 = 1062;

/// Statements run on every new connection. Without NO_AUTO_VALUE_ON_ZERO an
/// explicit 0 in an AUTO_INCREMENT column is replaced by the next counter value.
const SESSION_INIT: [&str; 2] = [
    "SET NAMES utf8mb4",
    "SET SESSION sql_mode = CONCAT_WS(',', NULLIF(@@SESSION.sql_mode, ''), 'NO_AUTO_VALUE_ON_ZERO')",
];

/// MySQL target loader implementation using mysql_async.
pub struct MysqlLoader {
    pool: Pool,
    dialect: MysqlDialect,
}

impl MysqlLoader {
    /// Connect and verify the connection with `SELECT 1`.
    pub async fn connect(locator: &TargetLocator) -> Result<Self> {
        let opts = Opts::from_url(locator.url())
            .map_err(|e| MigrateError::Config(format!("invalid MySQL locator {}: {}", locator, e)))?;

        let constraints = PoolConstraints::new(1, 1)
            .ok_or_else(|| MigrateError::Config("invalid MySQL pool constraints".into()))?;

        let mut builder = OptsBuilder::from_opts(opts)
            .init(SESSION_INIT.to_vec())
            .pool_opts(PoolOpts::new().with_constraints(constraints));

        match ssl_opts(locator.ssl_mode()) {
            Some(ssl) => builder = builder.ssl_opts(ssl),
            None => warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext."),
        }

        let opts: Opts = builder.into();
        let pool = Pool::new(opts);

        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::connection(e, format!("connecting to {}", locator)))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, "testing MySQL target connection"))?;
        drop(conn);

        info!("Connected to MySQL target: {}", locator);

        Ok(Self {
            pool,
            dialect: MysqlDialect::new(),
        })
    }

    async fn conn(&self) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::connection(e, "getting MySQL connection"))
    }
}

/// mysql_async cannot fall back from TLS to plain TCP, so `prefer` connects
/// without TLS.
fn ssl_opts(mode: SslMode) -> Option<SslOpts> {
    match mode {
        SslMode::Disable | SslMode::Prefer => None,
        SslMode::Require => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
        SslMode::VerifyCa => Some(SslOpts::default().with_danger_skip_domain_validation(true)),
        SslMode::VerifyFull => Some(SslOpts::default()),
    }
}

/// Convert a value for binding. Booleans become TINYINT 0/1.
fn to_mysql_value(value: &SqlValue) -> mysql_async::Value {
    match value {
        SqlValue::Null => mysql_async::Value::NULL,
        SqlValue::Bool(b) => mysql_async::Value::Int(i64::from(*b)),
        SqlValue::Int(i) => mysql_async::Value::Int(*i),
        SqlValue::Float(f) => mysql_async::Value::Double(*f),
        SqlValue::Text(s) => mysql_async::Value::Bytes(s.as_bytes().to_vec()),
        SqlValue::Bytes(b) => mysql_async::Value::Bytes(b.clone()),
    }
}

/// Classify a statement that affected no row from its warnings.
fn classify_warnings(warnings: &[(String, u32, String)]) -> RowOutcome {
    if warnings.is_empty() || warnings.iter().any(|(_, code, _)| *code == ER_DUP_ENTRY) {
        return RowOutcome::Conflict;
    }
    let reason = warnings
        .iter()
        .map(|(_, code, message)| format!("{} ({})", message, code))
        .collect::<Vec<_>>()
        .join("; ");
    RowOutcome::Rejected(reason)
}

#[async_trait]
impl TargetLoader for MysqlLoader {
    fn engine(&self) -> TargetEngine {
        TargetEngine::Mysql
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        match conn.query_drop(statement).await {
            Ok(()) => Ok(()),
            Err(mysql_async::Error::Server(e)) => {
                Err(MigrateError::Schema(format!("{} ({})", e.message, e.code)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn column_catalog(&self, table: &str) -> Result<ColumnCatalog> {
        let mut conn = self.conn().await?;
        catalog::load_columns(&mut conn, table).await
    }

    async fn load_table(&self, table: &str, mut batches: RowBatches) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let Some(first) = first_rows(&mut batches).await? else {
            return Ok(report);
        };

        let mut conn = self.conn().await?;
        let mut tx = conn
            .start_transaction(TxOpts::default())
            .await
            .map_err(|e| MigrateError::load(table, e))?;

        let mut statements: HashMap<Vec<String>, String> = HashMap::new();

        // An error from the stream drops the transaction uncommitted.
        let mut next = Some(first);
        while let Some(rows) = next {
            for row in &rows {
                let columns: Vec<String> = row.column_names().map(str::to_string).collect();
                let sql = statements
                    .entry(columns)
                    .or_insert_with_key(|cols| self.dialect.build_insert_ignore(table, cols));
                let params: Vec<mysql_async::Value> = row.values().map(to_mysql_value).collect();

                let outcome = match tx.exec_drop(sql.as_str(), params).await {
                    Ok(()) if tx.affected_rows() > 0 => RowOutcome::Applied,
                    Ok(()) => {
                        let warnings: Vec<(String, u32, String)> = tx
                            .query("SHOW WARNINGS")
                            .await
                            .map_err(|e| MigrateError::load(table, e))?;
                        classify_warnings(&warnings)
                    }
                    Err(mysql_async::Error::Server(e)) => {
                        RowOutcome::Rejected(format!("{} ({})", e.message, e.code))
                    }
                    // Dropping the transaction rolls the whole table back.
                    Err(e) => return Err(MigrateError::load(table, e)),
                };

                if let RowOutcome::Rejected(reason) = &outcome {
                    warn!("{}: row rejected: {}", table, reason);
                }
                report.record(outcome);
            }
            next = batches.recv().await.transpose()?;
        }

        tx.commit().await.map_err(|e| MigrateError::load(table, e))?;

        debug!(
            "{}: {} applied, {} conflicts, {} rejected",
            table,
            report.applied,
            report.conflicts,
            report.rejected_count()
        );
        Ok(report)
    }

    async fn resync_sequence(&self, table: &str, column: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        if !catalog::is_auto_increment(&mut conn, table, column).await? {
            return Err(MigrateError::Schema(format!(
                "{}.{} is not AUTO_INCREMENT",
                table, column
            )));
        }

        let max_sql = format!(
            "SELECT COALESCE(MAX({}), 0) FROM {}",
            self.dialect.quote_ident(column),
            self.dialect.quote_ident(table)
        );
        let max_val: Option<i64> = conn.query_first(&max_sql).await?;
        let next_val = max_val.unwrap_or(0) + 1;

        let reset_sql = format!(
            "ALTER TABLE {} AUTO_INCREMENT = {}",
            self.dialect.quote_ident(table),
            next_val
        );
        conn.query_drop(&reset_sql).await?;
        Ok(next_val)
    }

    async fn close(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            debug!("MySQL pool disconnect: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_mysql_value() {
        assert_eq!(to_mysql_value(&SqlValue::Null), mysql_async::Value::NULL);
        assert_eq!(to_mysql_value(&SqlValue::Bool(true)), mysql_async::Value::Int(1));
        assert_eq!(to_mysql_value(&SqlValue::Int(-3)), mysql_async::Value::Int(-3));
        assert_eq!(
            to_mysql_value(&SqlValue::from("abc")),
            mysql_async::Value::Bytes(b"abc".to_vec())
        );
    }

    #[test]
    fn test_session_keeps_explicit_zero_ids() {
        assert_eq!(SESSION_INIT[0], "SET NAMES utf8mb4");
        assert!(SESSION_INIT[1].contains("NO_AUTO_VALUE_ON_ZERO"));
        assert!(SESSION_INIT[1].contains("@@SESSION.sql_mode"));
    }

    #[test]
    fn test_classify_warnings() {
        assert_eq!(classify_warnings(&[]), RowOutcome::Conflict);

        let duplicate = vec![(
            "Warning".to_string(),
            1062,
            "Duplicate entry '1' for key 'PRIMARY'".to_string(),
        )];
        assert_eq!(classify_warnings(&duplicate), RowOutcome::Conflict);

        let fk = vec![(
            "Warning".to_string(),
            1452,
            "Cannot add or update a child row: a foreign key constraint fails".to_string(),
        )];
        match classify_warnings(&fk) {
            RowOutcome::Rejected(reason) => assert!(reason.contains("1452")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_ssl_opts() {
        assert!(ssl_opts(SslMode::Disable).is_none());
        assert!(ssl_opts(SslMode::Prefer).is_none());
        assert!(ssl_opts(SslMode::Require).is_some());
        assert!(ssl_opts(SslMode::VerifyFull).is_some());
    }
}
