/// Execution engine contract and value types.
pub mod engine;
/// Authenticated, authorizing connection wrapper.
pub mod secure;
/// SQLite execution engine.
pub mod sqlite;
