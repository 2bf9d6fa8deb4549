//! SQL value and row types exchanged between the source, the transform
//! pipeline and the target loaders.
//!
//! The value set is deliberately closed: everything a SQLite storage class can
//! hold, plus a native boolean for targets that have one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 64-bit signed integer.
    Int(i64),

    /// 64-bit floating point.
    Float(f64),

    /// Text data.
    Text(String),

    /// Opaque binary data.
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Borrow the text payload, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of the value, when it holds one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Short name of the variant, used in log lines and rejection reasons.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{:?}", v),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// An ordered mapping from column name to value.
///
/// Column order is the order in which the source returned the columns, and it
/// is the order used for the generated INSERT column list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    columns: Vec<(String, SqlValue)>,
}

impl TableRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty row with room for `n` columns.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            columns: Vec::with_capacity(n),
        }
    }

    /// Set a column, replacing the value in place if the column already exists.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Get the value of a column.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Check whether the row carries a column (NULL values count as present).
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|(name, _)| name == column)
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Values in column order.
    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.columns.iter().map(|(_, v)| v)
    }

    /// Iterate over `(column, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(|(name, v)| (name.as_str(), v))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl IntoIterator for TableRow {
    type Item = (String, SqlValue);
    type IntoIter = std::vec::IntoIter<(String, SqlValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for TableRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = TableRow::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_preserves_insertion_order() {
        let row = TableRow::new()
            .with("id", 1i64)
            .with("name", "primary")
            .with("psk", SqlValue::Null);

        let names: Vec<&str> = row.column_names().collect();
        assert_eq!(names, vec!["id", "name", "psk"]);
        assert!(row.contains("psk"));
        assert_eq!(row.get("name"), Some(&SqlValue::Text("primary".into())));
    }

    #[test]
    fn test_row_insert_replaces_in_place() {
        let mut row = TableRow::new().with("a", 1i64).with("b", 2i64);
        row.insert("a", 10i64);

        let pairs: Vec<(&str, &SqlValue)> = row.iter().collect();
        assert_eq!(pairs[0], ("a", &SqlValue::Int(10)));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_option_into_value() {
        let v: SqlValue = Option::<i64>::None.into();
        assert!(v.is_null());
        let v: SqlValue = Some("x").into();
        assert_eq!(v.as_text(), Some("x"));
    }

    #[test]
    fn test_value_deserializes_untagged() {
        let v: SqlValue = serde_yaml::from_str("42").unwrap();
        assert_eq!(v, SqlValue::Int(42));
        let v: SqlValue = serde_yaml::from_str("true").unwrap();
        assert_eq!(v, SqlValue::Bool(true));
        let v: SqlValue = serde_yaml::from_str("'light'").unwrap();
        assert_eq!(v, SqlValue::Text("light".into()));
    }
}
