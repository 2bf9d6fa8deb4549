//! Migration orchestrator - main workflow coordinator.
//!
//! Drives one run through `Init → Connected → SchemaReady → Migrating →
//! Resynced → Reported`. Any fatal error moves the run to `Failed`; both
//! connections are released whichever way the run ends.

mod stats;

pub use stats::{MigrationStats, MigrationSummary, ResyncRecord, TableStatus, MAX_REJECTION_SAMPLES};

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use tokio::sync::mpsc;

use crate::config::MigrationOptions;
use crate::core::{RowSource, TargetLoader, READ_AHEAD_BATCHES};
use crate::drivers::{connect_target, SqliteSource};
use crate::error::{MigrateError, Result};
use crate::plan::resolve_table_order;
use crate::schema::provider_for;
use crate::transform::prepare_row;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    Init,
    Connected,
    SchemaReady,
    Migrating,
    Resynced,
    Reported,
    Failed,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationPhase::Init => "init",
            MigrationPhase::Connected => "connected",
            MigrationPhase::SchemaReady => "schema-ready",
            MigrationPhase::Migrating => "migrating",
            MigrationPhase::Resynced => "resynced",
            MigrationPhase::Reported => "reported",
            MigrationPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    options: MigrationOptions,
    phase: MigrationPhase,
}

impl Orchestrator {
    /// Create a new orchestrator. Options are validated before anything
    /// connects.
    pub fn new(options: MigrationOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            phase: MigrationPhase::Init,
        })
    }

    /// Current phase.
    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    fn enter(&mut self, phase: MigrationPhase) {
        info!("Phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Connect to both stores and run the migration.
    pub async fn run(&mut self) -> Result<MigrationSummary> {
        info!(
            "Migrating {} -> {}{}",
            self.options.source,
            self.options.target,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let source: Arc<dyn RowSource> = match SqliteSource::connect(&self.options.source).await {
            Ok(source) => Arc::new(source),
            Err(e) => {
                self.fail(&e.to_string());
                return Err(e);
            }
        };
        let target: Arc<dyn TargetLoader> = match connect_target(&self.options.target).await {
            Ok(target) => Arc::from(target),
            Err(e) => {
                source.close().await;
                self.fail(&e.to_string());
                return Err(e);
            }
        };

        self.run_with(source, target).await
    }

    /// Run the migration over open connections, then close both whichever
    /// way the run ended.
    pub async fn run_with(
        &mut self,
        source: Arc<dyn RowSource>,
        target: Arc<dyn TargetLoader>,
    ) -> Result<MigrationSummary> {
        let result = self.execute(source.clone(), target.clone()).await;

        source.close().await;
        target.close().await;
        result
    }

    /// Run the migration over already-open connections. Does not close them.
    pub async fn execute(
        &mut self,
        source: Arc<dyn RowSource>,
        target: Arc<dyn TargetLoader>,
    ) -> Result<MigrationSummary> {
        match self.migrate(source.as_ref(), target.as_ref()).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                self.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn fail(&mut self, reason: &str) {
        error!("Migration failed in phase {}: {}", self.phase, reason);
        self.phase = MigrationPhase::Failed;
    }

    async fn migrate(
        &mut self,
        source: &dyn RowSource,
        target: &dyn TargetLoader,
    ) -> Result<MigrationSummary> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let dry_run = self.options.dry_run;
        let mut warnings = Vec::new();
        self.enter(MigrationPhase::Connected);
        info!("Run {} against {} target", run_id, target.engine());

        let source_tables = source.list_tables().await?;
        let tables = resolve_table_order(&source_tables, &self.options.spec);
        info!(
            "Resolved {} tables to migrate ({} in source)",
            tables.len(),
            source_tables.len()
        );

        if dry_run {
            info!("Dry run: schema application skipped");
        } else if let Some(provider) = provider_for(&self.options.schema, target.engine())? {
            info!("Applying {} schema", provider.name());
            if let Some(canonical) = provider.canonical_tables() {
                for table in tables.iter().filter(|t| !canonical.contains(*t)) {
                    warn!("{}: not in the schema's table list, migrating anyway", table);
                    warnings.push(format!("table {} is not part of the target schema", table));
                }
            }
            provider
                .apply(source, target, &tables, &self.options.spec)
                .await?;
        }
        self.enter(MigrationPhase::SchemaReady);

        self.enter(MigrationPhase::Migrating);
        let mut results = Vec::with_capacity(tables.len());
        for table in &tables {
            let stats = self.migrate_table(source, target, table).await?;
            match &stats.status {
                TableStatus::Migrated => info!(
                    "{}: {} source rows, {} migrated in {:.2?}",
                    table, stats.source_rows, stats.migrated_rows, stats.elapsed
                ),
                TableStatus::DryRun => info!("{}: {} source rows (dry run)", table, stats.source_rows),
                TableStatus::Empty => info!("{}: no rows, skipped", table),
                TableStatus::Unreadable(reason) => {
                    warn!("{}: unreadable, skipped: {}", table, reason);
                    warnings.push(format!("table {} could not be read: {}", table, reason));
                }
            }
            results.push(stats);
        }

        let mut resynced = Vec::new();
        if !dry_run {
            for stats in results.iter().filter(|s| s.status == TableStatus::Migrated) {
                let Some(column) = self.options.spec.identity_column(&stats.table) else {
                    continue;
                };
                match target.resync_sequence(&stats.table, column).await {
                    Ok(next_value) => {
                        debug!("{}.{}: identity continues at {}", stats.table, column, next_value);
                        resynced.push(ResyncRecord {
                            table: stats.table.clone(),
                            column: column.to_string(),
                            next_value,
                        });
                    }
                    Err(e) => {
                        warn!("{}.{}: identity not resynchronized: {}", stats.table, column, e);
                        warnings.push(format!(
                            "identity {}.{} was not resynchronized: {}",
                            stats.table, column, e
                        ));
                    }
                }
            }
        }
        self.enter(MigrationPhase::Resynced);

        let total_source_rows: u64 = results.iter().map(|s| s.source_rows).sum();
        let total_migrated_rows: u64 = results.iter().map(|s| s.migrated_rows).sum();
        if total_source_rows != total_migrated_rows {
            let message = format!(
                "migrated {} of {} source rows",
                total_migrated_rows, total_source_rows
            );
            warn!("Row count mismatch: {}", message);
            warnings.push(message);
        }

        let completed_at = Utc::now();
        let summary = MigrationSummary {
            run_id,
            dry_run,
            engine: target.engine(),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            tables: results,
            total_source_rows,
            total_migrated_rows,
            resynced,
            warnings,
        };

        info!(
            "Migration complete: {} tables, {}/{} rows in {:.1}s",
            summary.tables.len(),
            summary.total_migrated_rows,
            summary.total_source_rows,
            summary.duration_seconds
        );
        self.enter(MigrationPhase::Reported);
        Ok(summary)
    }

    /// Count, then (unless dry-run) stream, prepare and load one table.
    async fn migrate_table(
        &self,
        source: &dyn RowSource,
        target: &dyn TargetLoader,
        table: &str,
    ) -> Result<MigrationStats> {
        let started = Instant::now();
        let spec = &self.options.spec;

        let source_rows = match source.count_rows(table).await {
            Ok(n) => n,
            Err(e) => return Ok(MigrationStats::unreadable(table, e.to_string())),
        };
        if source_rows == 0 {
            return Ok(MigrationStats::empty(table));
        }
        if self.options.dry_run {
            return Ok(MigrationStats::dry_run(table, source_rows).with_elapsed(started.elapsed()));
        }

        let catalog = target.column_catalog(table).await?;
        if catalog.is_empty() {
            warn!("{}: table has no columns on the target, nothing will be written", table);
        }

        let engine = target.engine();
        let mut raw = source.read_table(table, self.options.batch_size);
        let (tx, prepared) = mpsc::channel(READ_AHEAD_BATCHES);

        // Rows are prepared while the loader drains the previous batch. A read
        // failure is forwarded so the loader abandons the table's transaction.
        let prepare = async {
            let tx = tx;
            let mut noop_rows = 0u64;
            let mut read_error = None;
            while let Some(batch) = raw.recv().await {
                let item = match batch {
                    Ok(rows) => Ok(rows
                        .into_iter()
                        .filter_map(|row| {
                            let prepared = prepare_row(table, row, spec, &catalog, engine);
                            if prepared.is_none() {
                                noop_rows += 1;
                            }
                            prepared
                        })
                        .collect::<Vec<_>>()),
                    Err(e) => {
                        let reason = e.to_string();
                        let abort =
                            MigrateError::load(table, format!("source read failed: {}", reason));
                        read_error = Some(reason);
                        Err(abort)
                    }
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
            (noop_rows, read_error)
        };

        let (loaded, (noop_rows, read_error)) =
            tokio::join!(target.load_table(table, prepared), prepare);
        if let Some(reason) = read_error {
            return Ok(MigrationStats::unreadable(table, reason));
        }
        let report = loaded?;
        if noop_rows > 0 {
            debug!("{}: {} rows had no target columns", table, noop_rows);
        }

        Ok(MigrationStats::migrated(table, source_rows, noop_rows, report)
            .with_elapsed(started.elapsed()))
    }
}
