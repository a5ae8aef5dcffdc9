//! PostgreSQL row decoding and parameter binding helpers

use bigdecimal::BigDecimal;
use bigdecimal::ToPrimitive as BigDecimalToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgRow, PgTypeKind, PgValueFormat, PgValueRef, Postgres};
use sqlx::query::{Query, QueryAs};
use sqlx::{Column, Row as SqlxRow, ValueRef};
use studio_core::{BindParam, Row, Value};
use uuid::Uuid;

pub(crate) fn read_i32(buf: &mut &[u8]) -> Option<i32> {
    if buf.len() < 4 {
        return None;
    }
    let (bytes, rest) = buf.split_at(4);
    *buf = rest;
    Some(i32::from_be_bytes(bytes.try_into().ok()?))
}

pub(crate) fn read_u32(buf: &mut &[u8]) -> Option<u32> {
    if buf.len() < 4 {
        return None;
    }
    let (bytes, rest) = buf.split_at(4);
    *buf = rest;
    Some(u32::from_be_bytes(bytes.try_into().ok()?))
}

/// Binds a text-form parameter. The statement casts it to the column type.
pub(crate) fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q BindParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        BindParam::Scalar(value) => query.bind(value.as_deref()),
        BindParam::List(values) => query.bind(values.as_slice()),
    }
}

/// Same as [`bind_param`] for typed `query_as` statements
pub(crate) fn bind_param_as<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    param: &'q BindParam,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    match param {
        BindParam::Scalar(value) => query.bind(value.as_deref()),
        BindParam::List(values) => query.bind(values.as_slice()),
    }
}

/// Converts a SQLx row into an ordered column-name → value row
pub(crate) fn convert_row(pg_row: &PgRow) -> Row {
    let columns = pg_row.columns();
    let mut row = Row::with_capacity(columns.len());
    for col in columns {
        row.push(col.name(), extract_value(pg_row, col.ordinal()));
    }
    row
}

fn finite_or_text(f: f64) -> Value {
    if f.is_finite() {
        Value::Float(f)
    } else {
        Value::Text(f.to_string())
    }
}

/// Extracts a value from a PgRow at the given index
pub(crate) fn extract_value(row: &PgRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(finite_or_text).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| finite_or_text(f as f64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
        return v
            .map(|d| {
                use rust_decimal::prelude::ToPrimitive;
                match d.to_f64() {
                    Some(f) if f.is_finite() => Value::Float(f),
                    _ => Value::Text(d.to_string()),
                }
            })
            .unwrap_or(Value::Null);
    }
    // NUMERIC values outside rust_decimal's range
    if let Ok(v) = row.try_get::<Option<BigDecimal>, _>(idx) {
        return v
            .map(|d| match d.to_f64() {
                Some(f) if f.is_finite() => Value::Float(f),
                _ => Value::Text(d.to_string()),
            })
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Uuid>, _>(idx) {
        return v.map(|u| Value::Text(u.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::Text).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(Value::Bytes).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.map(Value::Json).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|dt| Value::Text(dt.to_rfc3339())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v
            .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v
            .map(|t| Value::Text(t.format("%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<Option<i64>>>, _>(idx) {
        return v
            .map(|vals| array_of(vals, Value::Int))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<Option<i32>>>, _>(idx) {
        return v
            .map(|vals| array_of(vals, |i| Value::Int(i as i64)))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<Option<f64>>>, _>(idx) {
        return v
            .map(|vals| array_of(vals, finite_or_text))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<Option<bool>>>, _>(idx) {
        return v
            .map(|vals| array_of(vals, Value::Bool))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<Option<String>>>, _>(idx) {
        return v
            .map(|vals| array_of(vals, Value::Text))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<Option<Uuid>>>, _>(idx) {
        return v
            .map(|vals| array_of(vals, |u| Value::Text(u.to_string())))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<serde_json::Value>>, _>(idx) {
        return v
            .map(|vals| Value::Array(vals.into_iter().map(Value::Json).collect()))
            .unwrap_or(Value::Null);
    }

    let Ok(raw) = row.try_get_raw(idx) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }

    // Enum labels travel as their text in both wire formats; only arrays
    // need unpacking.
    let is_enum_array = row
        .columns()
        .get(idx)
        .map(|col| match col.type_info().kind() {
            PgTypeKind::Array(elem) => matches!(elem.kind(), PgTypeKind::Enum(_)),
            _ => false,
        })
        .unwrap_or(false);
    if is_enum_array {
        if let Some(value) = decode_label_array(&raw) {
            return value;
        }
    }

    if let Ok(text) = raw.as_str() {
        return Value::Text(text.to_string());
    }
    match raw.as_bytes() {
        Ok(bytes) if !bytes.is_empty() => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        _ => Value::Null,
    }
}

fn array_of<T>(vals: Vec<Option<T>>, f: impl Fn(T) -> Value) -> Value {
    Value::Array(
        vals.into_iter()
            .map(|item| item.map(&f).unwrap_or(Value::Null))
            .collect(),
    )
}

/// Decodes a one- or multi-dimensional array whose elements are text labels
pub(crate) fn decode_label_array(raw: &PgValueRef<'_>) -> Option<Value> {
    match raw.format() {
        PgValueFormat::Text => parse_text_array(raw.as_str().ok()?),
        PgValueFormat::Binary => parse_binary_array(raw.as_bytes().ok()?),
    }
}

/// `{a,"b c",NULL}` → `["a","b c",null]`, one dimension only
fn parse_text_array(text: &str) -> Option<Value> {
    let inner = text.trim().strip_prefix('{')?.strip_suffix('}')?;
    if inner.is_empty() {
        return Some(Value::Array(Vec::new()));
    }
    let values = inner
        .split(',')
        .map(|s| {
            let s = s.trim();
            if s.eq_ignore_ascii_case("null") {
                Value::Null
            } else {
                let label = s
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .unwrap_or(s);
                Value::Text(label.to_string())
            }
        })
        .collect();
    Some(Value::Array(values))
}

fn parse_binary_array(bytes: &[u8]) -> Option<Value> {
    let mut buf = bytes;

    let ndim = read_i32(&mut buf)?;
    let _has_nulls = read_i32(&mut buf)?;
    let _elem_oid = read_u32(&mut buf)?;

    if ndim <= 0 {
        return Some(Value::Array(Vec::new()));
    }

    let mut dims = Vec::with_capacity(ndim as usize);
    for _ in 0..ndim {
        let len = read_i32(&mut buf)?;
        let _lower_bound = read_i32(&mut buf)?;
        dims.push(usize::try_from(len).ok()?);
    }

    let total = dims
        .iter()
        .try_fold(1usize, |acc, &len| acc.checked_mul(len))?;

    let mut values = Vec::with_capacity(total);
    for _ in 0..total {
        let len = read_i32(&mut buf)?;
        if len < 0 {
            values.push(Value::Null);
            continue;
        }
        let len = len as usize;
        if buf.len() < len {
            return None;
        }
        let (elem, rest) = buf.split_at(len);
        values.push(Value::Text(String::from_utf8_lossy(elem).into_owned()));
        buf = rest;
    }

    fn nest(iter: &mut std::vec::IntoIter<Value>, dims: &[usize]) -> Option<Value> {
        let (&len, rest) = dims.split_first()?;
        let mut vals = Vec::with_capacity(len);
        for _ in 0..len {
            if rest.is_empty() {
                vals.push(iter.next()?);
            } else {
                vals.push(nest(iter, rest)?);
            }
        }
        Some(Value::Array(vals))
    }

    nest(&mut values.into_iter(), &dims)
}
