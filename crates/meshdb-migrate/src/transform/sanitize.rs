//! Engine-aware type sanitization, applied after the transform rules.

use crate::core::{ColumnType, SqlValue, TargetEngine};

/// Coerce a value toward the target column's category.
///
/// NULL always passes through untouched.
pub fn sanitize(value: SqlValue, category: ColumnType, engine: TargetEngine) -> SqlValue {
    if value.is_null() {
        return value;
    }
    match category {
        ColumnType::Integer => to_integer(value),
        ColumnType::Boolean => engine.boolean(truthy(&value)),
        _ => value,
    }
}

/// Truncate non-integral numbers and numeric strings toward zero.
fn to_integer(value: SqlValue) -> SqlValue {
    match value {
        SqlValue::Float(f) if f.is_finite() => SqlValue::Int(f.trunc() as i64),
        SqlValue::Text(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return SqlValue::Int(i);
            }
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() => SqlValue::Int(f.trunc() as i64),
                _ => SqlValue::Text(s),
            }
        }
        other => other,
    }
}

/// Loose boolean reading: 0/"0"/"false"/false and empty values are false,
/// everything else is true.
fn truthy(value: &SqlValue) -> bool {
    match value {
        SqlValue::Null => false,
        SqlValue::Bool(b) => *b,
        SqlValue::Int(i) => *i != 0,
        SqlValue::Float(f) => *f != 0.0 && !f.is_nan(),
        SqlValue::Text(s) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
        SqlValue::Bytes(b) => !b.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PG: TargetEngine = TargetEngine::Postgres;
    const MY: TargetEngine = TargetEngine::Mysql;

    #[test]
    fn test_integer_truncation() {
        assert_eq!(sanitize(SqlValue::Float(3.9), ColumnType::Integer, PG), SqlValue::Int(3));
        assert_eq!(sanitize(SqlValue::Float(-3.9), ColumnType::Integer, PG), SqlValue::Int(-3));
        assert_eq!(sanitize(SqlValue::from("12.7"), ColumnType::Integer, PG), SqlValue::Int(12));
        assert_eq!(sanitize(SqlValue::from(" 42 "), ColumnType::Integer, PG), SqlValue::Int(42));
        assert_eq!(
            sanitize(SqlValue::from("9007199254740993"), ColumnType::Integer, PG),
            SqlValue::Int(9_007_199_254_740_993)
        );
    }

    #[test]
    fn test_integer_passthrough() {
        assert_eq!(sanitize(SqlValue::Int(5), ColumnType::Integer, PG), SqlValue::Int(5));
        assert_eq!(
            sanitize(SqlValue::from("abc"), ColumnType::Integer, PG),
            SqlValue::from("abc")
        );
        assert!(matches!(
            sanitize(SqlValue::Float(f64::NAN), ColumnType::Integer, PG),
            SqlValue::Float(f) if f.is_nan()
        ));
    }

    #[test]
    fn test_boolean_normalization_postgres() {
        for falsy in [
            SqlValue::Int(0),
            SqlValue::from("0"),
            SqlValue::from("false"),
            SqlValue::Bool(false),
        ] {
            assert_eq!(sanitize(falsy, ColumnType::Boolean, PG), SqlValue::Bool(false));
        }
        for truthy in [
            SqlValue::Int(1),
            SqlValue::from("1"),
            SqlValue::from("true"),
            SqlValue::Bool(true),
            SqlValue::Int(7),
            SqlValue::from("yes"),
        ] {
            assert_eq!(sanitize(truthy, ColumnType::Boolean, PG), SqlValue::Bool(true));
        }
    }

    #[test]
    fn test_boolean_normalization_mysql() {
        assert_eq!(sanitize(SqlValue::Bool(true), ColumnType::Boolean, MY), SqlValue::Int(1));
        assert_eq!(sanitize(SqlValue::from("false"), ColumnType::Boolean, MY), SqlValue::Int(0));
    }

    #[test]
    fn test_null_never_coerced() {
        for category in [ColumnType::Integer, ColumnType::Boolean, ColumnType::Text] {
            assert_eq!(sanitize(SqlValue::Null, category, PG), SqlValue::Null);
            assert_eq!(sanitize(SqlValue::Null, category, MY), SqlValue::Null);
        }
    }

    #[test]
    fn test_other_types_unchanged() {
        assert_eq!(
            sanitize(SqlValue::Float(1.5), ColumnType::Float, PG),
            SqlValue::Float(1.5)
        );
        assert_eq!(
            sanitize(SqlValue::from("1"), ColumnType::Text, PG),
            SqlValue::from("1")
        );
    }
}
