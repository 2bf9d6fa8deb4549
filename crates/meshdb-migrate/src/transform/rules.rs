//! Table- and column-scoped value transforms.
//!
//! Every rule is total: any input, NULL included, yields a value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::SqlValue;

/// A transform keyed by (table, target column) in a `MigrationSpec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformRule {
    /// JSON-encoded array: `true` when it parses to a non-empty array, else `false`.
    JsonListNonEmpty,
    /// Map enumerated strings to their stored form; unknown strings pass through.
    Enum(BTreeMap<String, String>),
    /// `true` for integer 1, string "1" or boolean true; `false` for anything else.
    BooleanFlag,
}

impl TransformRule {
    /// Apply the rule to a value.
    pub fn apply(&self, value: SqlValue) -> SqlValue {
        match self {
            TransformRule::JsonListNonEmpty => SqlValue::Bool(json_list_non_empty(&value)),
            TransformRule::Enum(mapping) => match value {
                SqlValue::Text(s) => match mapping.get(&s) {
                    Some(canonical) => SqlValue::Text(canonical.clone()),
                    None => SqlValue::Text(s),
                },
                other => other,
            },
            TransformRule::BooleanFlag => SqlValue::Bool(matches!(
                value,
                SqlValue::Int(1) | SqlValue::Bool(true)
            ) || value.as_text() == Some("1")),
        }
    }
}

fn json_list_non_empty(value: &SqlValue) -> bool {
    let text = match value {
        SqlValue::Text(s) => s.as_str(),
        SqlValue::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => s,
            Err(_) => return false,
        },
        _ => return false,
    };
    matches!(
        serde_json::from_str::<serde_json::Value>(text),
        Ok(serde_json::Value::Array(items)) if !items.is_empty()
    )
}
