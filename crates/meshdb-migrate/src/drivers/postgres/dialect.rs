//! PostgreSQL SQL dialect.

use crate::core::Dialect;
use crate::drivers::sqlite::Affinity;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn build_insert_ignore(&self, table: &str, columns: &[String]) -> String {
        let cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let params = (1..=columns.len())
            .map(|i| self.param_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            self.quote_ident(table),
            cols,
            params
        )
    }

    fn map_source_type(&self, declared_type: &str, _is_primary_key: bool) -> String {
        match Affinity::of(declared_type) {
            Affinity::Integer => "BIGINT",
            Affinity::Boolean => "BOOLEAN",
            Affinity::Real => "DOUBLE PRECISION",
            Affinity::Numeric => "NUMERIC",
            Affinity::Text | Affinity::Untyped => "TEXT",
            Affinity::Blob => "BYTEA",
            Affinity::Json => "JSONB",
            Affinity::Timestamp => "TIMESTAMP",
        }
        .to_string()
    }

    fn identity_column(&self, name: &str) -> String {
        format!("{} BIGSERIAL PRIMARY KEY", self.quote_ident(name))
    }
}
