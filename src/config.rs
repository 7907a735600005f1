use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};
use crate::parser::names::normalize_identifier;
use crate::parser::sql_parser::SqlParser;

/// How column-scope records are matched against a referenced column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMatching {
    /// Both the record's table and its column must match (or be `*`).
    #[default]
    Strict,
    /// Any column-scope record naming the table grants every column.
    TableOnly,
}

/// Runtime settings for the authorization pipeline.
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `sqlparser` dialect name used to parse statements and row conditions.
    pub dialect: String,
    /// Columns treated as a table's identity column when qualifying row
    /// conditions with a table alias.
    pub identity_columns: Vec<String>,
    /// Column-permission matching mode.
    pub column_matching: ColumnMatching,
    /// Whether denials name the scope (table/column/row) that failed.
    pub detailed_denials: bool,
    /// Lifetime of a session in seconds.
    pub session_ttl_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: "sqlite".to_string(),
            identity_columns: vec!["user_id".to_string()],
            column_matching: ColumnMatching::Strict,
            detailed_denials: true,
            session_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl Config {
    /// Load configuration from a JSON string.
    pub fn load_from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| AuthzError::Config(format!("invalid configuration JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AuthzError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::load_from_json(&json)
    }

    /// Parser for the configured dialect.
    pub fn parser(&self) -> Result<SqlParser> {
        SqlParser::new(&self.dialect)
    }

    /// Identity column names, normalized for matching.
    pub fn normalized_identity_columns(&self) -> Vec<String> {
        self.identity_columns
            .iter()
            .map(|c| normalize_identifier(c))
            .filter(|c| !c.is_empty())
            .collect()
    }

    fn validate(&self) -> Result<()> {
        self.parser()?;
        if self.session_ttl_secs <= 0 {
            return Err(AuthzError::Config(format!(
                "session_ttl_secs must be positive, got {}",
                self.session_ttl_secs
            )));
        }
        Ok(())
    }
}
