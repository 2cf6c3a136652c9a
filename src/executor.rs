//! Read-only query execution against SQLite

use crate::compiler::{CompiledQuery, SqlParam};
use crate::error::{QueryError, Result};
use crate::view::Row;
use rusqlite::types::{ToSqlOutput, Value as SqliteValue, ValueRef};
use rusqlite::{Connection, OpenFlags, ToSql};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    pub rows: Vec<Row>,
    pub row_count: usize,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self { rows, row_count }
    }
}

pub trait QueryExecutor: Send + Sync {
    fn execute(&self, query: &CompiledQuery) -> Result<ResultSet>;
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlParam::Null => ToSqlOutput::Owned(SqliteValue::Null),
            SqlParam::Bool(b) => ToSqlOutput::Owned(SqliteValue::Integer(i64::from(*b))),
            SqlParam::Integer(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            SqlParam::Real(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
            SqlParam::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

pub struct SqliteExecutor {
    db: Mutex<Connection>,
}

impl SqliteExecutor {
    /// Open an existing database file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| QueryError::Execution(format!("Failed to open database {}: {}", path.display(), e)))?;
        Ok(Self::from_connection(db))
    }

    pub fn from_connection(db: Connection) -> Self {
        Self { db: Mutex::new(db) }
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

impl QueryExecutor for SqliteExecutor {
    fn execute(&self, query: &CompiledQuery) -> Result<ResultSet> {
        let db = self
            .db
            .lock()
            .map_err(|_| QueryError::Execution("Database connection lock poisoned".to_string()))?;

        let mut stmt = db.prepare(&query.sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(rusqlite::params_from_iter(query.params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                record.insert(name.clone(), to_json(row.get_ref(idx)?));
            }
            out.push(record);
        }

        debug!("Query returned {} row(s)", out.len());
        Ok(ResultSet::new(out))
    }
}
