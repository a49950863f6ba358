//! JSON row records to SQLite values and back

use crate::errors::invalid_input;
use base64::Engine;
use duckling_core::engine::{EngineResult, InsertData};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Map, Value};

pub type Row = Map<String, Value>;

/// Column affinity inferred from JSON values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn as_sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Integer),
            Value::Number(n) if n.is_f64() => Some(ColumnType::Real),
            Value::Number(_) => Some(ColumnType::Integer),
            Value::String(_) | Value::Array(_) | Value::Object(_) => Some(ColumnType::Text),
        }
    }
}

/// Decode insert data into row records
///
/// Accepts an array of objects or a single object, either as JSON or as
/// bytes holding JSON.
pub fn parse_rows(data: &InsertData) -> EngineResult<Vec<Row>> {
    let value = match data {
        InsertData::Json(value) => value.clone(),
        InsertData::Bytes(bytes) => serde_json::from_slice(bytes)
            .map_err(|e| invalid_input(format!("Payload bytes are not JSON rows: {}", e)))?,
    };
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(invalid_input(format!(
                    "Row records must be objects, got {}",
                    other
                ))),
            })
            .collect(),
        Value::Object(row) => Ok(vec![row]),
        other => Err(invalid_input(format!(
            "Payload must be an array of row objects, got {}",
            other
        ))),
    }
}

/// Columns in first-seen order, typed by their first non-null value
pub fn infer_columns(rows: &[Row]) -> Vec<(String, ColumnType)> {
    let mut columns: Vec<(String, Option<ColumnType>)> = Vec::new();
    for row in rows {
        for (name, value) in row {
            match columns.iter_mut().find(|(existing, _)| existing == name) {
                Some((_, ty)) if ty.is_none() => *ty = ColumnType::of(value),
                Some(_) => {}
                None => columns.push((name.clone(), ColumnType::of(value))),
            }
        }
    }
    columns
        .into_iter()
        .map(|(name, ty)| (name, ty.unwrap_or(ColumnType::Text)))
        .collect()
}

/// Convert one JSON cell for binding
pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        nested => SqlValue::Text(nested.to_string()),
    }
}

/// Convert one result cell to JSON
///
/// Blobs are returned base64 encoded.
pub fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
    }
}
