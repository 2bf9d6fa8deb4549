//! Table order resolution.
//!
//! The explicit `table_order` of the `MigrationSpec` goes first, filtered to tables the
//! source actually has and that are not skipped. Every other source table that
//! is not skipped follows, in source enumeration order.
//!
//! The explicit order is hand-maintained; foreign keys introspected from the
//! target are not consulted.

use std::collections::HashSet;

use tracing::debug;

use crate::spec::MigrationSpec;

/// Produce the duplicate-free sequence of tables to migrate.
pub fn resolve_table_order(source_tables: &[String], spec: &MigrationSpec) -> Vec<String> {
    let present: HashSet<&str> = source_tables.iter().map(String::as_str).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(source_tables.len());

    for table in &spec.table_order {
        if !present.contains(table.as_str()) {
            debug!("Ordered table {} is not in the source, ignoring", table);
            continue;
        }
        if spec.is_skipped_table(table) || !placed.insert(table.as_str()) {
            continue;
        }
        order.push(table.clone());
    }

    for table in source_tables {
        if spec.is_skipped_table(table) || !placed.insert(table.as_str()) {
            continue;
        }
        debug!("Table {} has no explicit position, appending", table);
        order.push(table.clone());
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn spec(order: &[&str], skip: &[&str]) -> MigrationSpec {
        MigrationSpec {
            table_order: names(order),
            skip_tables: skip.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_explicit_order_first_then_source_order() {
        let source = names(&["messages", "zeta", "nodes", "alpha", "channels"]);
        let spec = spec(&["nodes", "channels", "messages"], &[]);

        assert_eq!(
            resolve_table_order(&source, &spec),
            names(&["nodes", "channels", "messages", "zeta", "alpha"])
        );
    }

    #[test]
    fn test_skipped_tables_never_appear() {
        let source = names(&["sessions", "nodes", "audit_log"]);
        // "sessions" is both ordered and skipped; the skip wins.
        let spec = spec(&["sessions", "nodes"], &["sessions", "audit_log"]);

        let order = resolve_table_order(&source, &spec);
        assert_eq!(order, names(&["nodes"]));
    }

    #[test]
    fn test_missing_ordered_tables_are_dropped_silently() {
        let source = names(&["channels"]);
        let spec = spec(&["nodes", "channels", "telemetry"], &[]);

        assert_eq!(resolve_table_order(&source, &spec), names(&["channels"]));
    }

    #[test]
    fn test_no_duplicates() {
        let source = names(&["nodes", "nodes", "channels"]);
        let spec = spec(&["channels", "nodes"], &[]);

        assert_eq!(resolve_table_order(&source, &spec), names(&["channels", "nodes"]));
    }

    #[test]
    fn test_empty_spec_keeps_source_order() {
        let source = names(&["b", "a", "c"]);
        assert_eq!(
            resolve_table_order(&source, &MigrationSpec::default()),
            names(&["b", "a", "c"])
        );
    }
}
