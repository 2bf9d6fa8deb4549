//! DDL derived from the source's own table definitions.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::SchemaProvider;
use crate::core::{Dialect, RowSource, SourceColumn, SqlValue, TargetEngine, TargetLoader};
use crate::drivers::sqlite::Affinity;
use crate::drivers::DialectImpl;
use crate::error::{MigrateError, Result};
use crate::spec::{DefaultValue, MigrationSpec};
use crate::transform::TransformRule;

/// Emits `CREATE TABLE IF NOT EXISTS` per table. Refused statements are
/// logged and skipped.
pub struct DerivedSchema {
    dialect: DialectImpl,
}

impl DerivedSchema {
    pub fn new(engine: TargetEngine) -> Self {
        Self {
            dialect: DialectImpl::for_engine(engine),
        }
    }

    /// Build the CREATE TABLE statement for one table, or `None` when no
    /// column survives the configured column skips.
    pub fn create_table_sql(
        &self,
        table: &str,
        columns: &[SourceColumn],
        spec: &MigrationSpec,
    ) -> Option<String> {
        let d = &self.dialect;
        let kept: Vec<&SourceColumn> = columns
            .iter()
            .filter(|c| !spec.is_skipped_column(table, &c.name))
            .collect();

        let mut pk: Vec<&SourceColumn> = kept.iter().copied().filter(|c| c.is_primary_key()).collect();
        pk.sort_by_key(|c| c.pk_position);
        // Only a declared identity column gets a generator.
        let identity = match pk.as_slice() {
            [only]
                if Affinity::of(&only.declared_type) == Affinity::Integer
                    && spec.identity_column(table) == Some(spec.target_column(table, &only.name)) =>
            {
                Some(only.name.as_str())
            }
            _ => None,
        };

        let mut seen = HashSet::new();
        let mut defs = Vec::with_capacity(kept.len());
        for col in &kept {
            let name = spec.target_column(table, &col.name);
            if !seen.insert(name.to_string()) {
                continue;
            }
            if identity == Some(col.name.as_str()) {
                defs.push(d.identity_column(name));
                continue;
            }

            let declared = match spec.rule_for(table, name) {
                Some(TransformRule::JsonListNonEmpty | TransformRule::BooleanFlag) => "BOOLEAN",
                _ => col.declared_type.as_str(),
            };
            let mut def = format!(
                "{} {}",
                d.quote_ident(name),
                d.map_source_type(declared, col.is_primary_key())
            );
            if col.not_null {
                def.push_str(" NOT NULL");
            }
            defs.push(def);
        }

        if defs.is_empty() {
            return None;
        }

        if let Some(defaults) = spec.defaults_for(table) {
            for (name, generator) in defaults {
                if seen.insert(name.clone()) {
                    defs.push(format!(
                        "{} {}",
                        d.quote_ident(name),
                        d.map_source_type(default_declared_type(generator), false)
                    ));
                }
            }
        }

        if identity.is_none() && !pk.is_empty() {
            let cols = pk
                .iter()
                .map(|c| d.quote_ident(spec.target_column(table, &c.name)))
                .collect::<Vec<_>>()
                .join(", ");
            defs.push(format!("PRIMARY KEY ({})", cols));
        }

        Some(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n){}",
            d.quote_ident(table),
            defs.join(",\n    "),
            d.create_table_suffix()
        ))
    }
}

/// SQLite-style declared type for a generated column.
fn default_declared_type(generator: &DefaultValue) -> &'static str {
    match generator {
        DefaultValue::NowMillis | DefaultValue::NowSeconds => "INTEGER",
        DefaultValue::NowIso => "TEXT",
        DefaultValue::Literal(value) => match value {
            SqlValue::Int(_) => "INTEGER",
            SqlValue::Bool(_) => "BOOLEAN",
            SqlValue::Float(_) => "REAL",
            SqlValue::Bytes(_) => "BLOB",
            SqlValue::Null | SqlValue::Text(_) => "TEXT",
        },
    }
}

#[async_trait]
impl SchemaProvider for DerivedSchema {
    fn name(&self) -> &str {
        "derived"
    }

    async fn apply(
        &self,
        source: &dyn RowSource,
        target: &dyn TargetLoader,
        tables: &[String],
        spec: &MigrationSpec,
    ) -> Result<()> {
        let mut created = 0usize;
        for table in tables {
            let columns = match source.table_columns(table).await {
                Ok(columns) => columns,
                Err(e) => {
                    warn!("{}: cannot read source definition, no DDL derived: {}", table, e);
                    continue;
                }
            };
            let Some(sql) = self.create_table_sql(table, &columns, spec) else {
                debug!("{}: no columns to create", table);
                continue;
            };

            match target.execute_ddl(&sql).await {
                Ok(()) => created += 1,
                Err(MigrateError::Schema(msg)) => warn!("{}: DDL skipped: {}", table, msg),
                Err(e) => return Err(e),
            }
        }
        info!("Derived schema applied for {}/{} tables", created, tables.len());
        Ok(())
    }
}
