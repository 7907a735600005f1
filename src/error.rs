use thiserror::Error;

use crate::model::permission::Scope;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Failure raised by an authorization store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The user is not registered in the store.
    #[error("user {0} not found")]
    UnknownUser(String),

    /// No role with this name or id exists.
    #[error("role {0} not found")]
    UnknownRole(String),

    /// A role with this name already exists.
    #[error("role {0} already exists")]
    DuplicateRole(String),

    /// No session with this id exists.
    #[error("session {0} not found")]
    UnknownSession(String),

    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    /// A policy or store file could not be read.
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite backend failure.
    #[error("sqlite store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored or seeded data could not be (de)serialized.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Every error the authorization pipeline can surface.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Empty user or table name, or another malformed argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Statement text (or a stored row condition) could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// A table, column or row check failed.
    ///
    /// `scope` is `None` when denials are configured not to reveal which
    /// check failed.
    #[error("{}", denial_message(.object, .scope))]
    PermissionDenied {
        /// The table or `table.column` that failed the check.
        object: String,
        /// Which check denied access.
        scope: Option<Scope>,
    },

    /// The authorization store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The statement type is not handled by the analyzer.
    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),

    /// The execution engine rejected the authorized statement.
    #[error("execution error: {0}")]
    Execution(String),

    /// Credentials or session were rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

fn denial_message(object: &str, scope: &Option<Scope>) -> String {
    match scope {
        Some(scope) => format!("permission denied for {scope}: {object}"),
        None => format!("permission denied: {object}"),
    }
}

impl AuthzError {
    /// Convenience constructor for a denial.
    pub fn denied(object: impl Into<String>, scope: Scope) -> Self {
        AuthzError::PermissionDenied {
            object: object.into(),
            scope: Some(scope),
        }
    }

    /// True for [`AuthzError::PermissionDenied`].
    pub fn is_denial(&self) -> bool {
        matches!(self, AuthzError::PermissionDenied { .. })
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AuthzError::InvalidInput(_) => "INVALID_INPUT",
            AuthzError::Parse(_) => "PARSE_ERROR",
            AuthzError::PermissionDenied { .. } => "PERMISSION_DENIED",
            AuthzError::Store(_) => "STORE_ERROR",
            AuthzError::UnsupportedStatement(_) => "UNSUPPORTED_STATEMENT",
            AuthzError::Execution(_) => "QUERY_ERROR",
            AuthzError::Authentication(_) => "AUTH_ERROR",
            AuthzError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<sqlparser::parser::ParserError> for AuthzError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        AuthzError::Parse(err.to_string())
    }
}
