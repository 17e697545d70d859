//! Conversions between libSQL values and record fields

use libsql::{Row, Value};

use crate::error::{Error, Result};

pub fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

pub fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, text)
}

pub const fn integer(value: i64) -> Value {
    Value::Integer(value)
}

pub const fn opt_integer(value: Option<i64>) -> Value {
    match value {
        Some(value) => Value::Integer(value),
        None => Value::Null,
    }
}

pub const fn real(value: f64) -> Value {
    Value::Real(value)
}

pub fn get_text(row: &Row, idx: i32) -> Result<String> {
    get_opt_text(row, idx)?.ok_or_else(|| unexpected(idx, "NULL", "TEXT"))
}

pub fn get_opt_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(value) => Ok(Some(value)),
        other => Err(unexpected(idx, type_name(&other), "TEXT")),
    }
}

pub fn get_integer(row: &Row, idx: i32) -> Result<i64> {
    get_opt_integer(row, idx)?.ok_or_else(|| unexpected(idx, "NULL", "INTEGER"))
}

pub fn get_opt_integer(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(unexpected(idx, type_name(&other), "INTEGER")),
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn get_real(row: &Row, idx: i32) -> Result<f64> {
    match row.get_value(idx)? {
        Value::Real(value) => Ok(value),
        Value::Integer(value) => Ok(value as f64),
        other => Err(unexpected(idx, type_name(&other), "REAL")),
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Integer(_) => "INTEGER",
        Value::Real(_) => "REAL",
        Value::Text(_) => "TEXT",
        Value::Blob(_) => "BLOB",
    }
}

fn unexpected(idx: i32, found: &str, expected: &str) -> Error {
    Error::Database(format!(
        "column {idx}: expected {expected}, found {found}"
    ))
}
