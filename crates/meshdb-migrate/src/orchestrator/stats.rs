//! Per-table statistics and the run summary.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::core::{LoadReport, TargetEngine};

/// Number of rejection reasons kept per table.
pub const MAX_REJECTION_SAMPLES: usize = 20;

/// How a table's migration ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum TableStatus {
    /// Rows were loaded (some may have been skipped or rejected).
    Migrated,
    /// The source table has no rows; nothing was written.
    Empty,
    /// The source table could not be counted or read; treated as zero rows.
    Unreadable(String),
    /// Counted only.
    DryRun,
}

/// Result of migrating one table.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStats {
    pub table: String,
    pub source_rows: u64,
    /// Rows actually written. Equals `source_rows` in a dry run.
    pub migrated_rows: u64,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    #[serde(flatten)]
    pub status: TableStatus,
    /// Rows skipped as duplicates of existing keys.
    pub conflicts: u64,
    /// Rows the target refused.
    pub rejected: u64,
    /// Rows with no column left after mapping.
    pub noop_rows: u64,
    /// Up to [`MAX_REJECTION_SAMPLES`] rejection reasons.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejections: Vec<String>,
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl MigrationStats {
    fn new(table: &str, status: TableStatus) -> Self {
        Self {
            table: table.to_string(),
            source_rows: 0,
            migrated_rows: 0,
            elapsed: Duration::ZERO,
            status,
            conflicts: 0,
            rejected: 0,
            noop_rows: 0,
            rejections: Vec::new(),
        }
    }

    pub fn empty(table: &str) -> Self {
        Self::new(table, TableStatus::Empty)
    }

    pub fn unreadable(table: &str, reason: impl Into<String>) -> Self {
        Self::new(table, TableStatus::Unreadable(reason.into()))
    }

    pub fn dry_run(table: &str, source_rows: u64) -> Self {
        Self {
            source_rows,
            migrated_rows: source_rows,
            ..Self::new(table, TableStatus::DryRun)
        }
    }

    pub fn migrated(table: &str, source_rows: u64, noop_rows: u64, report: LoadReport) -> Self {
        let rejected = report.rejected_count();
        let mut rejections = report.rejected;
        rejections.truncate(MAX_REJECTION_SAMPLES);
        Self {
            source_rows,
            migrated_rows: report.applied,
            conflicts: report.conflicts,
            rejected,
            noop_rows,
            rejections,
            ..Self::new(table, TableStatus::Migrated)
        }
    }

    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }
}

/// An identity generator moved past the migrated data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResyncRecord {
    pub table: String,
    pub column: String,
    pub next_value: i64,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    /// Unique run identifier.
    pub run_id: String,
    pub dry_run: bool,
    pub engine: TargetEngine,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Total duration in seconds.
    pub duration_seconds: f64,
    /// Per-table stats in migration order.
    pub tables: Vec<MigrationStats>,
    pub total_source_rows: u64,
    pub total_migrated_rows: u64,
    pub resynced: Vec<ResyncRecord>,
    /// Non-fatal problems worth an operator's attention.
    pub warnings: Vec<String>,
}

impl MigrationSummary {
    /// Look up a table's stats.
    pub fn table(&self, name: &str) -> Option<&MigrationStats> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Whether the migrated total differs from the source total.
    pub fn has_mismatch(&self) -> bool {
        self.total_source_rows != self.total_migrated_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrated_caps_rejection_samples() {
        let report = LoadReport {
            applied: 5,
            conflicts: 2,
            rejected: (0..30).map(|i| format!("row {}", i)).collect(),
        };
        let stats = MigrationStats::migrated("messages", 37, 0, report);

        assert_eq!(stats.migrated_rows, 5);
        assert_eq!(stats.rejected, 30);
        assert_eq!(stats.rejections.len(), MAX_REJECTION_SAMPLES);
        assert_eq!(stats.rejections[0], "row 0");
    }

    #[test]
    fn test_stats_serialize() {
        let stats = MigrationStats::unreadable("gone", "no such table")
            .with_elapsed(Duration::from_millis(1500));
        let json = serde_json::to_value(&stats).unwrap();

        assert_eq!(json["table"], "gone");
        assert_eq!(json["elapsed_ms"], 1500);
        assert_eq!(json["status"], "unreadable");
        assert_eq!(json["reason"], "no such table");
        assert!(json.get("rejections").is_none());

        let json = serde_json::to_value(MigrationStats::dry_run("channels", 3)).unwrap();
        assert_eq!(json["status"], "dry_run");
        assert_eq!(json["migrated_rows"], 3);
    }
}
