use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A single nullable scalar cell produced by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::Integer(n),
            ValueRef::Real(f) => Value::Real(f),
            // SQLite does not enforce UTF-8 on TEXT; keep whatever decodes.
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(bytes) => write!(f, "x'{}'", hex::encode(bytes)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(n) => serializer.serialize_i64(*n),
            // Non-finite reals have no JSON representation.
            Value::Real(v) if !v.is_finite() => serializer.serialize_none(),
            Value::Real(v) => serializer.serialize_f64(*v),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(bytes) => bytes.serialize(serializer),
        }
    }
}

/// What a [`QueryResult`] means for display purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// The statement ran but produced no tabular output (DDL/DML).
    Empty,
    /// Columns were declared but no rows came back.
    NoRows,
    Rows,
}

/// One table-shaped output: the columns and rows of a single statement.
///
/// [`crate::EngineHandle::execute`] yields one of these per result-producing
/// statement; the execution adapter surfaces only the first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// The "statement executed, nothing to show" result.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> ResultKind {
        if self.columns.is_empty() {
            ResultKind::Empty
        } else if self.rows.is_empty() {
            ResultKind::NoRows
        } else {
            ResultKind::Rows
        }
    }

    /// Whether every row has exactly one cell per column.
    pub fn is_rectangular(&self) -> bool {
        let width = self.columns.len();
        self.rows.iter().all(|row| row.len() == width)
    }
}

/// One result set group as produced by the engine, before the adapter picks
/// the first.
pub type ResultSet = QueryResult;

/// A user-named query persisted across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQuery {
    pub name: String,
    pub query: String,
}
