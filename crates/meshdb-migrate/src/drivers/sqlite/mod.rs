//! SQLite source driver.
//!
//! - [`SqliteSource`]: read-only [`RowSource`](crate::core::RowSource) over a
//!   SQLite file
//! - [`Affinity`]: SQLite's column type affinity, used to derive target DDL

mod reader;

pub use reader::SqliteSource;

/// Storage class a SQLite column's declared type resolves to.
///
/// Follows SQLite's affinity rules, with `BOOL`, `JSON` and `DATE`/`TIME`
/// declarations recognised before the generic rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Integer,
    Boolean,
    Real,
    Numeric,
    Text,
    Blob,
    Json,
    Timestamp,
    /// No declared type at all.
    Untyped,
}

impl Affinity {
    pub fn of(declared_type: &str) -> Self {
        let t = declared_type.trim().to_uppercase();
        if t.is_empty() {
            Affinity::Untyped
        } else if t.contains("BOOL") {
            Affinity::Boolean
        } else if t.contains("JSON") {
            Affinity::Json
        } else if t.contains("INT") {
            Affinity::Integer
        } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
            Affinity::Text
        } else if t.contains("BLOB") {
            Affinity::Blob
        } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
            Affinity::Real
        } else if t.contains("DATE") || t.contains("TIME") {
            Affinity::Timestamp
        } else {
            Affinity::Numeric
        }
    }
}
