//! PostgreSQL target loader.
//!
//! Uses a single-connection deadpool-postgres pool. Each table is loaded in one
//! transaction; each row runs inside a savepoint so a refused row does not
//! abort the rows around it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Config as PgConfig, Statement, Transaction};
use tracing::{debug, info, warn};

use super::catalog;
use super::params::{to_param, PgParam};
use super::PostgresDialect;
use crate::config::TargetLocator;
use crate::core::{
    first_rows, ColumnCatalog, Dialect, LoadReport, RowBatches, RowOutcome, TableRow,
    TargetEngine, TargetLoader,
};
use crate::drivers::common::{SslMode, TlsBuilder};
use crate::error::{MigrateError, Result};

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const ROW_SAVEPOINT: &str = "meshdb_row";

/// Why a single row did not go in.
enum RowError {
    /// The server refused the row; the table continues.
    Rejected(String),
    /// The connection failed; the table is rolled back.
    Fatal(tokio_postgres::Error),
}

impl From<tokio_postgres::Error> for RowError {
    fn from(e: tokio_postgres::Error) -> Self {
        match e.as_db_error() {
            Some(db) => RowError::Rejected(format!("{} ({})", db.message(), db.code().code())),
            None => RowError::Fatal(e),
        }
    }
}

/// PostgreSQL target loader.
pub struct PostgresLoader {
    pool: Pool,
    dialect: PostgresDialect,
}

impl PostgresLoader {
    /// Connect and verify the connection with `SELECT 1`.
    pub async fn connect(locator: &TargetLocator) -> Result<Self> {
        let mut pg_config: PgConfig = locator
            .url()
            .parse()
            .map_err(|e| MigrateError::Config(format!("invalid PostgreSQL locator {}: {}", locator, e)))?;

        pg_config.keepalives(true);
        pg_config.connect_timeout(CONNECT_TIMEOUT);
        pg_config.ssl_mode(match locator.ssl_mode() {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => PgSslMode::Require,
        });

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match TlsBuilder::new(locator.ssl_mode()).build()? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
        };

        let pool = Pool::builder(mgr)
            .max_size(1)
            .build()
            .map_err(|e| MigrateError::connection(e, "creating PostgreSQL target pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(e, format!("connecting to {}", locator)))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, "testing PostgreSQL target connection"))?;

        info!("Connected to PostgreSQL target: {}", locator);

        Ok(Self {
            pool,
            dialect: PostgresDialect::new(),
        })
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(e, context.to_string()))
    }

    /// Insert one row. Must run inside a savepoint.
    async fn insert_row(
        &self,
        tx: &Transaction<'_>,
        table: &str,
        statements: &mut HashMap<Vec<String>, Statement>,
        row: &TableRow,
    ) -> std::result::Result<RowOutcome, RowError> {
        let columns: Vec<String> = row.column_names().map(str::to_string).collect();
        let stmt = match statements.get(&columns) {
            Some(stmt) => stmt.clone(),
            None => {
                let sql = self.dialect.build_insert_ignore(table, &columns);
                let stmt = tx.prepare(&sql).await?;
                statements.insert(columns, stmt.clone());
                stmt
            }
        };

        let params = row
            .values()
            .zip(stmt.params())
            .map(|(value, ty)| to_param(value, ty))
            .collect::<std::result::Result<Vec<PgParam>, String>>()
            .map_err(RowError::Rejected)?;
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let affected = tx.execute(&stmt, &refs).await?;
        Ok(if affected == 0 {
            RowOutcome::Conflict
        } else {
            RowOutcome::Applied
        })
    }
}

/// Describe a server error by message and SQLSTATE when there is one.
fn describe(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!("{} ({})", db.message(), db.code().code()),
        None => e.to_string(),
    }
}

#[async_trait]
impl TargetLoader for PostgresLoader {
    fn engine(&self) -> TargetEngine {
        TargetEngine::Postgres
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        let client = self.client("getting PostgreSQL connection").await?;
        match client.batch_execute(statement).await {
            Ok(()) => Ok(()),
            Err(e) if e.as_db_error().is_some() => Err(MigrateError::Schema(describe(&e))),
            Err(e) => Err(e.into()),
        }
    }

    async fn column_catalog(&self, table: &str) -> Result<ColumnCatalog> {
        let client = self.client("getting PostgreSQL connection").await?;
        catalog::load_columns(&client, table).await
    }

    async fn load_table(&self, table: &str, mut batches: RowBatches) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let Some(first) = first_rows(&mut batches).await? else {
            return Ok(report);
        };

        let mut object = self.client("getting PostgreSQL connection").await?;
        let client: &mut tokio_postgres::Client = &mut object;
        let tx = client
            .transaction()
            .await
            .map_err(|e| MigrateError::load(table, describe(&e)))?;

        let mut statements = HashMap::new();
        let savepoint = format!("SAVEPOINT {}", ROW_SAVEPOINT);
        let release = format!("RELEASE SAVEPOINT {}", ROW_SAVEPOINT);
        let rollback = format!("ROLLBACK TO SAVEPOINT {}", ROW_SAVEPOINT);

        // An error from the stream drops the transaction uncommitted.
        let mut next = Some(first);
        while let Some(rows) = next {
            for row in &rows {
                tx.batch_execute(&savepoint)
                    .await
                    .map_err(|e| MigrateError::load(table, describe(&e)))?;

                let outcome = match self.insert_row(&tx, table, &mut statements, row).await {
                    Ok(outcome) => {
                        tx.batch_execute(&release)
                            .await
                            .map_err(|e| MigrateError::load(table, describe(&e)))?;
                        outcome
                    }
                    Err(RowError::Rejected(reason)) => {
                        tx.batch_execute(&rollback)
                            .await
                            .map_err(|e| MigrateError::load(table, describe(&e)))?;
                        warn!("{}: row rejected: {}", table, reason);
                        RowOutcome::Rejected(reason)
                    }
                    // Dropping the transaction rolls the whole table back.
                    Err(RowError::Fatal(e)) => return Err(MigrateError::load(table, e)),
                };
                report.record(outcome);
            }
            next = batches.recv().await.transpose()?;
        }

        tx.commit()
            .await
            .map_err(|e| MigrateError::load(table, describe(&e)))?;

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
        let client = self.client("getting PostgreSQL connection").await?;
        let table_ident = self.dialect.quote_ident(table);
        let sql = format!(
            "SELECT setval(pg_get_serial_sequence($1, $2), COALESCE(MAX({}), 0) + 1, false) FROM {}",
            self.dialect.quote_ident(column),
            table_ident
        );

        let row = client.query_one(&sql, &[&table_ident, &column]).await?;
        let next: Option<i64> = row.get(0);
        next.ok_or_else(|| {
            MigrateError::Schema(format!("{}.{} has no sequence", table, column))
        })
    }

    async fn close(&self) {
        self.pool.close();
    }
}
