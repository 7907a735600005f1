use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use rusqlite::types::{ToSql, ValueRef};
use rusqlite::Connection;
use serde_json::{json, Value};

use super::engine::{ExecResult, ExecutionEngine, QueryResult, SqlValue};
use crate::error::{AuthzError, Result};

fn execution_error(err: rusqlite::Error) -> AuthzError {
    AuthzError::Execution(err.to_string())
}

fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => json!(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => json!(format!("BLOB({} bytes)", b.len())),
    }
}

fn bind(params: &[SqlValue]) -> Vec<Box<dyn ToSql>> {
    params
        .iter()
        .map(|p| -> Box<dyn ToSql> {
            match p {
                SqlValue::Null => Box::new(rusqlite::types::Null),
                SqlValue::Integer(i) => Box::new(*i),
                SqlValue::Real(f) => Box::new(*f),
                SqlValue::Text(s) => Box::new(s.clone()),
                SqlValue::Bool(b) => Box::new(i64::from(*b)),
                SqlValue::Blob(b) => Box::new(b.clone()),
            }
        })
        .collect()
}

/// [`ExecutionEngine`] over one rusqlite connection.
pub struct SqliteEngine {
    conn: Mutex<Connection>,
}

impl SqliteEngine {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(execution_error)?;
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(execution_error)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AuthzError::Execution("connection lock poisoned".to_string()))
    }

    /// Run several statements without authorization, for schema setup and
    /// fixtures.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql).map_err(execution_error)
    }
}

impl ExecutionEngine for SqliteEngine {
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
        let conn = self.conn()?;
        let start = Instant::now();

        let mut stmt = conn.prepare(sql).map_err(execution_error)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let values = bind(params);
        let refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(refs.as_slice(), |row| {
                let mut out = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    out.push(value_ref_to_json(row.get_ref(i)?));
                }
                Ok(out)
            })
            .map_err(execution_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(execution_error)?;

        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecResult> {
        let conn = self.conn()?;
        let start = Instant::now();

        let values = bind(params);
        let refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
        let affected = conn
            .execute(sql, refs.as_slice())
            .map_err(execution_error)?;

        Ok(ExecResult {
            affected_rows: affected as u64,
            last_insert_id: Some(conn.last_insert_rowid()),
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}
