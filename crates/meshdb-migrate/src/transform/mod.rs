//! Row preparation: column mapping, value transforms and type sanitization.
//!
//! A source row flows through [`mapper::map_row`], then each retained column
//! gets its [`TransformRule`] (if any) and finally [`sanitize::sanitize`] for
//! the target column's category.

pub mod mapper;
pub mod rules;
pub mod sanitize;

pub use mapper::{map_row, MappedColumn, MappedRow};
pub use rules::TransformRule;
pub use sanitize::sanitize;

use crate::core::{ColumnCatalog, TableRow, TargetEngine};
use crate::spec::MigrationSpec;

/// Prepare one source row for insertion into `table`.
///
/// Returns `None` when no column survives mapping; such rows are not written.
pub fn prepare_row(
    table: &str,
    row: TableRow,
    spec: &MigrationSpec,
    catalog: &ColumnCatalog,
    engine: TargetEngine,
) -> Option<TableRow> {
    let mapped = map_row(table, row, spec, catalog);
    if mapped.is_empty() {
        return None;
    }

    let mut out = TableRow::with_capacity(mapped.columns.len());
    for MappedColumn {
        name,
        value,
        category,
    } in mapped.columns
    {
        let value = match spec.rule_for(table, &name) {
            Some(rule) => rule.apply(value),
            None => value,
        };
        let value = sanitize(value, category, engine);
        out.insert(name, value);
    }
    Some(out)
}
