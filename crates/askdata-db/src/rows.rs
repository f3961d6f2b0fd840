//! Conversion of warehouse rows into JSON values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Number, Value};
use sqlx::postgres::{PgColumn, PgRow};
use sqlx::types::BigDecimal;
use sqlx::{Column, Decode, Postgres, Row as _, Type, TypeInfo, ValueRef};
use tracing::trace;
use uuid::Uuid;

use askdata_core::{ColumnMeta, Row};

/// Column metadata for a described or fetched statement.
pub fn column_meta(columns: &[PgColumn]) -> Vec<ColumnMeta> {
    columns
        .iter()
        .map(|c| ColumnMeta::new(c.name(), c.type_info().name()))
        .collect()
}

/// Convert one row into a name-keyed JSON map.
pub fn row_to_json(row: &PgRow) -> Row {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), column_value(row, idx));
    }
    out
}

fn decode<'r, T>(row: &'r PgRow, idx: usize, f: impl FnOnce(T) -> Value) -> Value
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => f(v),
        Ok(None) => Value::Null,
        Err(e) => {
            trace!(column = idx, error = %e, "Value could not be decoded, using null");
            Value::Null
        }
    }
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn column_value(row: &PgRow, idx: usize) -> Value {
    if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
        return Value::Null;
    }

    let type_name = row.columns()[idx].type_info().name().to_ascii_uppercase();
    match type_name.as_str() {
        "BOOL" => decode::<bool>(row, idx, Value::Bool),
        "INT2" => decode::<i16>(row, idx, |v| Value::from(v)),
        "INT4" => decode::<i32>(row, idx, |v| Value::from(v)),
        "INT8" => decode::<i64>(row, idx, |v| Value::from(v)),
        "FLOAT4" => decode::<f32>(row, idx, |v| float(v as f64)),
        "FLOAT8" => decode::<f64>(row, idx, float),
        "NUMERIC" => decode::<BigDecimal>(row, idx, numeric),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" => {
            decode::<String>(row, idx, Value::String)
        }
        "DATE" => decode::<NaiveDate>(row, idx, |v| Value::String(v.to_string())),
        "TIME" => decode::<NaiveTime>(row, idx, |v| Value::String(v.to_string())),
        "TIMESTAMP" => decode::<NaiveDateTime>(row, idx, |v| {
            Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }),
        "TIMESTAMPTZ" => decode::<DateTime<Utc>>(row, idx, |v| Value::String(v.to_rfc3339())),
        "JSON" | "JSONB" => decode::<Value>(row, idx, |v| v),
        "UUID" => decode::<Uuid>(row, idx, |v| Value::String(v.to_string())),
        _ => match row.try_get_unchecked::<Option<String>, _>(idx) {
            Ok(Some(s)) => Value::String(s),
            _ => Value::Null,
        },
    }
}

/// Numerics become JSON numbers when they fit an integer or a finite f64.
fn numeric(v: BigDecimal) -> Value {
    let text = v.to_string();
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => float(f),
        _ => Value::String(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_numeric_integer_becomes_integer() {
        let v = numeric(BigDecimal::from_str("1500000").unwrap());
        assert_eq!(v, Value::from(1500000i64));
    }

    #[test]
    fn test_numeric_fraction_becomes_float() {
        let v = numeric(BigDecimal::from_str("2750.25").unwrap());
        assert_eq!(v.as_f64(), Some(2750.25));
    }

    #[test]
    fn test_float_nan_is_null() {
        assert_eq!(float(f64::NAN), Value::Null);
    }
}
