//! MySQL/MariaDB SQL dialect.

use crate::core::Dialect;
use crate::drivers::sqlite::Affinity;

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
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
            "INSERT IGNORE INTO {} ({}) VALUES ({})",
            self.quote_ident(table),
            cols,
            params
        )
    }

    fn map_source_type(&self, declared_type: &str, is_primary_key: bool) -> String {
        // TEXT and BLOB columns cannot be keyed without a prefix length.
        match Affinity::of(declared_type) {
            Affinity::Integer => "BIGINT",
            Affinity::Boolean => "TINYINT(1)",
            Affinity::Real => "DOUBLE",
            Affinity::Numeric => "DECIMAL(38,10)",
            Affinity::Text | Affinity::Untyped if is_primary_key => "VARCHAR(255)",
            Affinity::Text | Affinity::Untyped => "TEXT",
            Affinity::Blob if is_primary_key => "VARBINARY(255)",
            Affinity::Blob => "LONGBLOB",
            Affinity::Json => "JSON",
            Affinity::Timestamp => "DATETIME(3)",
        }
        .to_string()
    }

    fn identity_column(&self, name: &str) -> String {
        format!("{} BIGINT AUTO_INCREMENT PRIMARY KEY", self.quote_ident(name))
    }

    fn create_table_suffix(&self) -> &str {
        " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"
    }
}
