//! Binding of [`SqlValue`]s to PostgreSQL parameters.
//!
//! Values are converted up front against the prepared statement's parameter
//! types, so a value the column cannot hold is reported as a row rejection
//! instead of surfacing as a client-side serialization error.

use std::error::Error;
use std::str::FromStr;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, Kind, ToSql, Type};
use uuid::Uuid;

use crate::core::SqlValue;

/// A parameter already shaped for its target type.
#[derive(Debug, Clone, PartialEq)]
pub enum PgParam {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    /// Text-family and enum types; sent as raw UTF-8.
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Uuid(Uuid),
}

impl ToSql for PgParam {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            PgParam::Null => Ok(IsNull::Yes),
            PgParam::Bool(v) => v.to_sql(ty, out),
            PgParam::I16(v) => v.to_sql(ty, out),
            PgParam::I32(v) => v.to_sql(ty, out),
            PgParam::I64(v) => v.to_sql(ty, out),
            PgParam::F32(v) => v.to_sql(ty, out),
            PgParam::F64(v) => v.to_sql(ty, out),
            PgParam::Decimal(v) => v.to_sql(ty, out),
            PgParam::Text(v) => {
                out.extend_from_slice(v.as_bytes());
                Ok(IsNull::No)
            }
            PgParam::Bytes(v) => {
                out.extend_from_slice(v);
                Ok(IsNull::No)
            }
            PgParam::Json(v) => v.to_sql(ty, out),
            PgParam::Timestamp(v) => v.to_sql(ty, out),
            PgParam::TimestampTz(v) => v.to_sql(ty, out),
            PgParam::Date(v) => v.to_sql(ty, out),
            PgParam::Time(v) => v.to_sql(ty, out),
            PgParam::Uuid(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Convert a value for a parameter of type `ty`.
///
/// Returns a human-readable reason when the value cannot be represented.
pub fn to_param(value: &SqlValue, ty: &Type) -> Result<PgParam, String> {
    if value.is_null() {
        return Ok(PgParam::Null);
    }

    let param = match *ty {
        Type::BOOL => PgParam::Bool(to_bool(value).ok_or_else(|| mismatch(value, ty))?),
        Type::INT2 => {
            let v = to_i64(value).ok_or_else(|| mismatch(value, ty))?;
            PgParam::I16(i16::try_from(v).map_err(|_| out_of_range(v, ty))?)
        }
        Type::INT4 => {
            let v = to_i64(value).ok_or_else(|| mismatch(value, ty))?;
            PgParam::I32(i32::try_from(v).map_err(|_| out_of_range(v, ty))?)
        }
        Type::INT8 => PgParam::I64(to_i64(value).ok_or_else(|| mismatch(value, ty))?),
        Type::FLOAT4 => PgParam::F32(to_f64(value).ok_or_else(|| mismatch(value, ty))? as f32),
        Type::FLOAT8 => PgParam::F64(to_f64(value).ok_or_else(|| mismatch(value, ty))?),
        Type::NUMERIC => PgParam::Decimal(to_decimal(value).ok_or_else(|| mismatch(value, ty))?),
        Type::JSON | Type::JSONB => PgParam::Json(to_json(value)),
        Type::BYTEA => match value {
            SqlValue::Bytes(b) => PgParam::Bytes(b.clone()),
            SqlValue::Text(s) => PgParam::Bytes(s.as_bytes().to_vec()),
            other => return Err(mismatch(other, ty)),
        },
        Type::TIMESTAMP => {
            PgParam::Timestamp(to_timestamp(value).ok_or_else(|| mismatch(value, ty))?.naive_utc())
        }
        Type::TIMESTAMPTZ => {
            PgParam::TimestampTz(to_timestamp(value).ok_or_else(|| mismatch(value, ty))?)
        }
        Type::DATE => PgParam::Date(to_date(value).ok_or_else(|| mismatch(value, ty))?),
        Type::TIME => PgParam::Time(to_time(value).ok_or_else(|| mismatch(value, ty))?),
        Type::UUID => PgParam::Uuid(to_uuid(value).ok_or_else(|| mismatch(value, ty))?),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            PgParam::Text(to_text(value).ok_or_else(|| mismatch(value, ty))?)
        }
        _ if matches!(ty.kind(), Kind::Enum(_)) || ty.name() == "citext" => {
            PgParam::Text(to_text(value).ok_or_else(|| mismatch(value, ty))?)
        }
        _ => return Err(format!("unsupported target type {}", ty.name())),
    };
    Ok(param)
}

fn mismatch(value: &SqlValue, ty: &Type) -> String {
    format!("cannot store {} value '{}' in a {} column", value.kind(), value, ty.name())
}

fn out_of_range(v: i64, ty: &Type) -> String {
    format!("{} is out of range for {}", v, ty.name())
}

fn to_bool(value: &SqlValue) -> Option<bool> {
    match value {
        SqlValue::Bool(b) => Some(*b),
        SqlValue::Int(i) => Some(*i != 0),
        SqlValue::Float(f) => Some(*f != 0.0),
        SqlValue::Text(s) => match s.trim().to_lowercase().as_str() {
            "t" | "true" | "1" | "yes" | "on" => Some(true),
            "f" | "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_i64(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Int(i) => Some(*i),
        SqlValue::Bool(b) => Some(i64::from(*b)),
        SqlValue::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
        SqlValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_f64(value: &SqlValue) -> Option<f64> {
    match value {
        SqlValue::Float(f) => Some(*f),
        SqlValue::Int(i) => Some(*i as f64),
        SqlValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        SqlValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_decimal(value: &SqlValue) -> Option<Decimal> {
    match value {
        SqlValue::Int(i) => Some(Decimal::from(*i)),
        SqlValue::Float(f) => Decimal::try_from(*f).ok(),
        SqlValue::Bool(b) => Some(Decimal::from(i64::from(*b))),
        SqlValue::Text(s) => Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .ok(),
        _ => None,
    }
}

fn to_text(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Text(s) => Some(s.clone()),
        SqlValue::Int(i) => Some(i.to_string()),
        SqlValue::Float(f) => Some(f.to_string()),
        SqlValue::Bool(b) => Some(b.to_string()),
        SqlValue::Bytes(b) => String::from_utf8(b.clone()).ok(),
        SqlValue::Null => None,
    }
}

fn to_json(value: &SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Text(s) => {
            serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.clone()))
        }
        SqlValue::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.into())),
            Err(_) => serde_json::Value::Null,
        },
        SqlValue::Int(i) => serde_json::Value::from(*i),
        SqlValue::Float(f) => serde_json::Value::from(*f),
        SqlValue::Bool(b) => serde_json::Value::Bool(*b),
        SqlValue::Null => serde_json::Value::Null,
    }
}

/// Integers are epoch milliseconds; strings may be RFC 3339, SQLite's
/// `YYYY-MM-DD HH:MM:SS[.fff]`, or a plain number of milliseconds.
fn to_timestamp(value: &SqlValue) -> Option<DateTime<Utc>> {
    match value {
        SqlValue::Int(ms) => DateTime::from_timestamp_millis(*ms),
        SqlValue::Float(ms) if ms.is_finite() => DateTime::from_timestamp_millis(*ms as i64),
        SqlValue::Text(s) => {
            let s = s.trim();
            if let Ok(ms) = s.parse::<i64>() {
                return DateTime::from_timestamp_millis(ms);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

/// Dates accept anything [`to_timestamp`] does, or a bare `YYYY-MM-DD`.
fn to_date(value: &SqlValue) -> Option<NaiveDate> {
    if let SqlValue::Text(s) = value {
        if let Ok(date) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            return Some(date);
        }
    }
    to_timestamp(value).map(|dt| dt.date_naive())
}

fn to_time(value: &SqlValue) -> Option<NaiveTime> {
    match value {
        SqlValue::Text(s) => ["%H:%M:%S%.f", "%H:%M"]
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(s.trim(), fmt).ok()),
        _ => None,
    }
}

/// Hyphenated or simple text, or the 16 raw bytes.
fn to_uuid(value: &SqlValue) -> Option<Uuid> {
    match value {
        SqlValue::Text(s) => Uuid::parse_str(s.trim()).ok(),
        SqlValue::Bytes(b) => Uuid::from_slice(b).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_binds_for_any_type() {
        for ty in [Type::INT8, Type::BOOL, Type::TEXT, Type::TIMESTAMPTZ] {
            assert_eq!(to_param(&SqlValue::Null, &ty).unwrap(), PgParam::Null);
        }
    }

    #[test]
    fn test_integer_widths() {
        assert_eq!(to_param(&SqlValue::Int(5), &Type::INT8).unwrap(), PgParam::I64(5));
        assert_eq!(to_param(&SqlValue::Int(5), &Type::INT4).unwrap(), PgParam::I32(5));
        assert_eq!(to_param(&SqlValue::Bool(true), &Type::INT2).unwrap(), PgParam::I16(1));
        assert!(to_param(&SqlValue::Int(70_000), &Type::INT2).is_err());
        assert!(to_param(&SqlValue::from("abc"), &Type::INT8).is_err());
        assert!(to_param(&SqlValue::Float(1.5), &Type::INT8).is_err());
    }

    #[test]
    fn test_bool_and_text() {
        assert_eq!(to_param(&SqlValue::Int(0), &Type::BOOL).unwrap(), PgParam::Bool(false));
        assert_eq!(to_param(&SqlValue::from("t"), &Type::BOOL).unwrap(), PgParam::Bool(true));
        assert!(to_param(&SqlValue::from("maybe"), &Type::BOOL).is_err());
        assert_eq!(
            to_param(&SqlValue::Int(42), &Type::TEXT).unwrap(),
            PgParam::Text("42".into())
        );
        assert!(to_param(&SqlValue::Bytes(vec![0xff]), &Type::VARCHAR).is_err());
    }

    #[test]
    fn test_json() {
        assert_eq!(
            to_param(&SqlValue::from("[1,2]"), &Type::JSONB).unwrap(),
            PgParam::Json(serde_json::json!([1, 2]))
        );
        assert_eq!(
            to_param(&SqlValue::from("plain"), &Type::JSON).unwrap(),
            PgParam::Json(serde_json::json!("plain"))
        );
    }

    #[test]
    fn test_timestamps() {
        let expected = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(
            to_param(&SqlValue::Int(1_700_000_000_123), &Type::TIMESTAMPTZ).unwrap(),
            PgParam::TimestampTz(expected)
        );
        assert_eq!(
            to_param(&SqlValue::from("2023-11-14 22:13:20.123"), &Type::TIMESTAMP).unwrap(),
            PgParam::Timestamp(expected.naive_utc())
        );
        assert_eq!(
            to_param(&SqlValue::from("2023-11-14T22:13:20.123Z"), &Type::TIMESTAMPTZ).unwrap(),
            PgParam::TimestampTz(expected)
        );
        assert!(to_param(&SqlValue::from("yesterday"), &Type::TIMESTAMP).is_err());
    }

    #[test]
    fn test_uuid_date_and_time() {
        let id = "6f1c2a9e-3b4d-4e5f-8a7b-9c0d1e2f3a4b";
        assert_eq!(
            to_param(&SqlValue::from(id), &Type::UUID).unwrap(),
            PgParam::Uuid(Uuid::parse_str(id).unwrap())
        );
        assert!(to_param(&SqlValue::from("not-a-uuid"), &Type::UUID).is_err());

        let day = NaiveDate::from_ymd_opt(2023, 11, 14).unwrap();
        assert_eq!(to_param(&SqlValue::from("2023-11-14"), &Type::DATE).unwrap(), PgParam::Date(day));
        assert_eq!(
            to_param(&SqlValue::Int(1_700_000_000_123), &Type::DATE).unwrap(),
            PgParam::Date(day)
        );

        assert_eq!(
            to_param(&SqlValue::from("22:13:20"), &Type::TIME).unwrap(),
            PgParam::Time(NaiveTime::from_hms_opt(22, 13, 20).unwrap())
        );
        assert!(to_param(&SqlValue::Int(5), &Type::TIME).is_err());
    }

    #[test]
    fn test_numeric() {
        assert_eq!(
            to_param(&SqlValue::from("12.50"), &Type::NUMERIC).unwrap(),
            PgParam::Decimal(Decimal::from_str("12.50").unwrap())
        );
        assert_eq!(
            to_param(&SqlValue::Int(3), &Type::NUMERIC).unwrap(),
            PgParam::Decimal(Decimal::from(3))
        );
    }

    #[test]
    fn test_unsupported_type_is_reported() {
        let err = to_param(&SqlValue::Int(1), &Type::POINT).unwrap_err();
        assert!(err.contains("point"));
    }
}
