//! The migration spec: table ordering, skip sets, column renames, default
//! generators, transform rules and identity columns.
//!
//! A [`MigrationSpec`] is built once before a run and handed to the
//! orchestrator by value. Nothing mutates it afterwards.

mod meshmonitor;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::core::SqlValue;
use crate::error::{MigrateError, Result};
use crate::transform::TransformRule;

/// Generator for a target column that the source does not provide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// Current time as Unix epoch milliseconds.
    NowMillis,
    /// Current time as Unix epoch seconds.
    NowSeconds,
    /// Current time as an RFC 3339 string.
    NowIso,
    /// A fixed value.
    Literal(SqlValue),
}

impl DefaultValue {
    /// Produce a value. Time-based generators read the clock on every call.
    pub fn generate(&self) -> SqlValue {
        match self {
            DefaultValue::NowMillis => SqlValue::Int(Utc::now().timestamp_millis()),
            DefaultValue::NowSeconds => SqlValue::Int(Utc::now().timestamp()),
            DefaultValue::NowIso => {
                SqlValue::Text(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            DefaultValue::Literal(v) => v.clone(),
        }
    }
}

/// Process-wide, read-only configuration for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationSpec {
    /// Explicit dependency order: parents before the tables referencing them.
    pub table_order: Vec<String>,

    /// Tables never migrated.
    pub skip_tables: BTreeSet<String>,

    /// table -> (source column -> target column).
    pub column_mappings: BTreeMap<String, BTreeMap<String, String>>,

    /// table -> source columns dropped unconditionally.
    pub skip_columns: BTreeMap<String, BTreeSet<String>>,

    /// table -> (target column -> generator) for columns absent from the source.
    pub default_values: BTreeMap<String, BTreeMap<String, DefaultValue>>,

    /// table -> (target column -> rule) applied before type sanitization.
    pub transforms: BTreeMap<String, BTreeMap<String, TransformRule>>,

    /// table -> column whose values come from a server-side generator.
    pub identity_columns: BTreeMap<String, String>,
}

impl MigrationSpec {
    /// Builtin migration rules for a MeshMonitor database.
    pub fn meshmonitor() -> Self {
        meshmonitor::spec()
    }

    /// Load a spec from a YAML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a spec from YAML and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let spec: MigrationSpec = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Whether a table is excluded from the run.
    pub fn is_skipped_table(&self, table: &str) -> bool {
        self.skip_tables.contains(table)
    }

    /// Whether a source column of a table is dropped.
    pub fn is_skipped_column(&self, table: &str, column: &str) -> bool {
        self.skip_columns
            .get(table)
            .is_some_and(|cols| cols.contains(column))
    }

    /// Resolve the target name of a source column (identity if unmapped).
    pub fn target_column<'a>(&'a self, table: &str, column: &'a str) -> &'a str {
        self.column_mappings
            .get(table)
            .and_then(|m| m.get(column))
            .map(String::as_str)
            .unwrap_or(column)
    }

    /// Default generators for a table.
    pub fn defaults_for(&self, table: &str) -> Option<&BTreeMap<String, DefaultValue>> {
        self.default_values.get(table)
    }

    /// Transform rule for a target column.
    pub fn rule_for(&self, table: &str, column: &str) -> Option<&TransformRule> {
        self.transforms.get(table).and_then(|rules| rules.get(column))
    }

    /// Identity column of a table, if it has one.
    pub fn identity_column(&self, table: &str) -> Option<&str> {
        self.identity_columns.get(table).map(String::as_str)
    }

    /// Reject contradictory rules.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for table in &self.table_order {
            if !seen.insert(table.as_str()) {
                return Err(MigrateError::Config(format!(
                    "table_order lists '{}' more than once",
                    table
                )));
            }
        }

        for (table, mappings) in &self.column_mappings {
            let mut targets = HashSet::new();
            for (source, target) in mappings {
                if self.is_skipped_column(table, source) {
                    return Err(MigrateError::Config(format!(
                        "{}.{} is both renamed and skipped",
                        table, source
                    )));
                }
                if !targets.insert(target.as_str()) {
                    return Err(MigrateError::Config(format!(
                        "{}: more than one column is renamed to '{}'",
                        table, target
                    )));
                }
            }
        }

        for table in self.identity_columns.keys() {
            if self.is_skipped_table(table) {
                return Err(MigrateError::Config(format!(
                    "identity column declared for skipped table '{}'",
                    table
                )));
            }
        }

        Ok(())
    }
}
