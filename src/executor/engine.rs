use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Positional parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// Floating point number.
    Real(f64),
    /// Text.
    Text(String),
    /// Boolean, bound as `0`/`1` where the engine has no boolean type.
    Bool(bool),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Interpret a command-line literal: `null`, an integer, a real,
    /// `true`/`false`, or otherwise text.
    pub fn from_literal(literal: &str) -> Self {
        if literal.eq_ignore_ascii_case("null") {
            return SqlValue::Null;
        }
        if let Ok(i) = literal.parse::<i64>() {
            return SqlValue::Integer(i);
        }
        if let Ok(f) = literal.parse::<f64>() {
            return SqlValue::Real(f);
        }
        match literal {
            "true" => SqlValue::Bool(true),
            "false" => SqlValue::Bool(false),
            _ => SqlValue::Text(literal.to_string()),
        }
    }
}

/// Rows returned by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Result column names.
    pub columns: Vec<String>,
    /// One JSON value per column, per row.
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Wall time spent in the engine.
    pub execution_time_ms: u64,
}

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    /// Rows inserted, updated or deleted.
    pub affected_rows: u64,
    /// Row id of the last insert, when the engine tracks one.
    pub last_insert_id: Option<i64>,
    /// Wall time spent in the engine.
    pub execution_time_ms: u64,
}

/// Storage engine that runs authorized SQL text.
///
/// Engines see only statements that already passed the authorization
/// pipeline. Failures surface as [`AuthzError::Execution`](crate::error::AuthzError::Execution).
pub trait ExecutionEngine: Send + Sync {
    /// Run a statement that returns rows.
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult>;

    /// Run a statement that returns no rows.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecResult>;
}
