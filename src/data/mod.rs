//! Row data model: cell values, field descriptors, and producer deltas

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Textual rendering used by the full-text column and the CSV export.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bool(v) => (*v as i64).to_string(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(v) => ToSqlOutput::Owned((*v).into()),
            Value::Real(v) => ToSqlOutput::Owned((*v).into()),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bool(v) => ToSqlOutput::Owned((*v as i64).into()),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).into_owned()),
            ValueRef::Blob(b) => Value::Text(String::from_utf8_lossy(b).into_owned()),
        })
    }
}

/// Field type vocabulary recognised by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    /// Text compared case-insensitively by the engine
    TextNoCase,
    Integer,
    Real,
    /// Stored as TEXT in ISO form
    DateTime,
    /// Stored as INTEGER 0/1
    Bool,
}

impl FieldType {
    /// DDL column type for this field kind.
    pub fn ddl_type(&self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::TextNoCase => "TEXT COLLATE NOCASE",
            FieldType::Integer => "INTEGER",
            FieldType::Real => "REAL",
            FieldType::DateTime => "TEXT",
            FieldType::Bool => "INTEGER",
        }
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Column name in the store
    pub name: String,
    /// Data type
    pub field_type: FieldType,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// One producer delta: a full-row insert-or-replace, or a delete by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowDelta {
    Upsert(Vec<Value>),
    Delete(i64),
}

/// An ordered batch of deltas accumulated between heavy operations.
pub type DeltaBatch = Vec<RowDelta>;

/// Maps a `common` full-text column index to the set of source column
/// indices concatenated into it.
pub type CommonIndexRanges = BTreeMap<usize, BTreeSet<usize>>;

/// Concatenated textual representation of the configured source columns,
/// used for case-insensitive full-text filtering. Fragments are prefixed
/// with `]` so adjacent cell values cannot form accidental matches.
pub fn full_text_value(values: &[Value], indexes: &BTreeSet<usize>) -> String {
    let mut common = String::new();
    for &i in indexes {
        if let Some(value) = values.get(i) {
            common.push(']');
            common.push_str(&value.render());
        }
    }
    common
}
