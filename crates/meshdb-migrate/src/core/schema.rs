//! Schema metadata: target engines, column type categories and the per-table
//! column catalog reported by a target engine.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::SqlValue;

/// The supported target engine families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetEngine {
    Postgres,
    Mysql,
}

impl TargetEngine {
    /// Engine identifier used in logs and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            TargetEngine::Postgres => "postgres",
            TargetEngine::Mysql => "mysql",
        }
    }

    /// The engine's native representation of a boolean.
    ///
    /// PostgreSQL has a real `boolean`; MySQL stores booleans as `TINYINT(1)`.
    pub fn boolean(&self, v: bool) -> SqlValue {
        match self {
            TargetEngine::Postgres => SqlValue::Bool(v),
            TargetEngine::Mysql => SqlValue::Int(i64::from(v)),
        }
    }
}

impl fmt::Display for TargetEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Data-type category of a target column, as far as sanitization cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Boolean,
    Float,
    Decimal,
    Text,
    Json,
    Binary,
    Timestamp,
    Other,
}

impl ColumnType {
    /// Classify a PostgreSQL `udt_name` (falling back to `data_type`).
    pub fn from_postgres(udt_name: &str) -> Self {
        match udt_name.to_lowercase().as_str() {
            "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "serial"
            | "bigserial" | "smallserial" => ColumnType::Integer,
            "bool" | "boolean" => ColumnType::Boolean,
            "float4" | "float8" | "real" | "double precision" => ColumnType::Float,
            "numeric" | "decimal" => ColumnType::Decimal,
            "text" | "varchar" | "bpchar" | "char" | "name" | "citext" | "character varying"
            | "character" | "uuid" => ColumnType::Text,
            "json" | "jsonb" => ColumnType::Json,
            "bytea" => ColumnType::Binary,
            "timestamp" | "timestamptz" | "date" => ColumnType::Timestamp,
            _ => ColumnType::Other,
        }
    }

    /// Classify a MySQL column from `DATA_TYPE` and the full `COLUMN_TYPE`.
    ///
    /// `TINYINT(1)` and `BIT(1)` are the conventional MySQL booleans.
    pub fn from_mysql(data_type: &str, column_type: &str) -> Self {
        let column_type = column_type.to_lowercase();
        if column_type.starts_with("tinyint(1)") || column_type == "bit(1)" {
            return ColumnType::Boolean;
        }
        match data_type.to_lowercase().as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" => {
                ColumnType::Integer
            }
            "bool" | "boolean" => ColumnType::Boolean,
            "float" | "double" | "real" => ColumnType::Float,
            "decimal" | "numeric" => ColumnType::Decimal,
            "char" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext" | "enum"
            | "set" => ColumnType::Text,
            "json" => ColumnType::Json,
            "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "bit" => {
                ColumnType::Binary
            }
            "date" | "datetime" | "timestamp" => ColumnType::Timestamp,
            _ => ColumnType::Other,
        }
    }
}

/// A column as reported by the target engine's catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    /// Engine-reported type name (e.g. "int8", "tinyint(1)").
    pub data_type: String,
    /// Sanitization category.
    pub category: ColumnType,
}

/// Per target table: column name to declared type.
///
/// Fetched once per table per run and never cached across runs.
#[derive(Debug, Clone, Default)]
pub struct ColumnCatalog {
    table: String,
    columns: HashMap<String, CatalogColumn>,
}

impl ColumnCatalog {
    /// Create an empty catalog for a table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: HashMap::new(),
        }
    }

    /// Register a column.
    pub fn add(&mut self, name: impl Into<String>, data_type: impl Into<String>, category: ColumnType) {
        self.columns.insert(
            name.into(),
            CatalogColumn {
                data_type: data_type.into(),
                category,
            },
        );
    }

    /// Builder-style [`add`](Self::add) with the category's name as data type.
    #[must_use]
    pub fn with(mut self, name: &str, category: ColumnType) -> Self {
        self.add(name, format!("{:?}", category).to_lowercase(), category);
        self
    }

    /// Table this catalog describes.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Look up a column.
    pub fn get(&self, column: &str) -> Option<&CatalogColumn> {
        self.columns.get(column)
    }

    /// Category of a column, if the target has it.
    pub fn category(&self, column: &str) -> Option<ColumnType> {
        self.columns.get(column).map(|c| c.category)
    }

    /// Whether the target table has the column.
    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the target table is missing or has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A column definition read from the source store (`PRAGMA table_info`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumn {
    pub name: String,
    /// Declared type as written in the SQLite DDL; may be empty.
    pub declared_type: String,
    pub not_null: bool,
    /// 1-based position in the primary key, 0 if not part of it.
    pub pk_position: i32,
}

impl SourceColumn {
    /// Whether the column is part of the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.pk_position > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_categories() {
        assert_eq!(ColumnType::from_postgres("int8"), ColumnType::Integer);
        assert_eq!(ColumnType::from_postgres("bool"), ColumnType::Boolean);
        assert_eq!(ColumnType::from_postgres("jsonb"), ColumnType::Json);
        assert_eq!(ColumnType::from_postgres("varchar"), ColumnType::Text);
        assert_eq!(ColumnType::from_postgres("tsvector"), ColumnType::Other);
    }

    #[test]
    fn test_mysql_tinyint1_is_boolean() {
        assert_eq!(ColumnType::from_mysql("tinyint", "tinyint(1)"), ColumnType::Boolean);
        assert_eq!(ColumnType::from_mysql("tinyint", "tinyint(4)"), ColumnType::Integer);
        assert_eq!(ColumnType::from_mysql("bigint", "bigint unsigned"), ColumnType::Integer);
        assert_eq!(ColumnType::from_mysql("longtext", "longtext"), ColumnType::Text);
    }

    #[test]
    fn test_engine_boolean_representation() {
        assert_eq!(TargetEngine::Postgres.boolean(true), SqlValue::Bool(true));
        assert_eq!(TargetEngine::Mysql.boolean(false), SqlValue::Int(0));
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = ColumnCatalog::new("channels")
            .with("id", ColumnType::Integer)
            .with("uplinkEnabled", ColumnType::Boolean);
        assert!(catalog.contains("id"));
        assert_eq!(catalog.category("uplinkEnabled"), Some(ColumnType::Boolean));
        assert_eq!(catalog.category("missing"), None);
        assert_eq!(catalog.len(), 2);
    }
}
