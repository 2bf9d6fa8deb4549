//! Column mapping: rename, drop, and inject defaults.

use std::collections::HashSet;

use tracing::debug;

use crate::core::{ColumnCatalog, ColumnType, SqlValue, TableRow};
use crate::spec::MigrationSpec;

/// A retained column, tagged with the category the target declares for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedColumn {
    pub name: String,
    pub value: SqlValue,
    pub category: ColumnType,
}

/// A row containing only columns the target recognizes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedRow {
    pub columns: Vec<MappedColumn>,
}

impl MappedRow {
    /// Whether no column survived mapping.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Look up a mapped column by target name.
    pub fn get(&self, name: &str) -> Option<&MappedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Map one source row onto the target table's columns.
///
/// Source columns are skipped, renamed, then kept only if the catalog has the
/// resolved name. Defaults are injected afterwards for catalog columns nothing
/// populated, unless the source column of that name was renamed to another
/// target column. A skipped column still receives its default.
pub fn map_row(
    table: &str,
    row: TableRow,
    spec: &MigrationSpec,
    catalog: &ColumnCatalog,
) -> MappedRow {
    let renamed_away: HashSet<String> = row
        .column_names()
        .filter(|c| !spec.is_skipped_column(table, c) && spec.target_column(table, c) != *c)
        .map(str::to_string)
        .collect();
    let mut mapped = MappedRow {
        columns: Vec::with_capacity(row.len()),
    };

    for (column, value) in row {
        if spec.is_skipped_column(table, &column) {
            continue;
        }
        let target = spec.target_column(table, &column);
        let Some(category) = catalog.category(target) else {
            debug!("{}.{}: no target column '{}', dropping", table, column, target);
            continue;
        };
        if mapped.get(target).is_some() {
            debug!("{}.{}: '{}' already populated, dropping", table, column, target);
            continue;
        }
        mapped.columns.push(MappedColumn {
            name: target.to_string(),
            value,
            category,
        });
    }

    if let Some(defaults) = spec.defaults_for(table) {
        for (column, generator) in defaults {
            if mapped.get(column).is_some() || renamed_away.contains(column) {
                continue;
            }
            if let Some(category) = catalog.category(column) {
                mapped.columns.push(MappedColumn {
                    name: column.clone(),
                    value: generator.generate(),
                    category,
                });
            }
        }
    }

    mapped
}
