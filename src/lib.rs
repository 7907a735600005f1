//! Table-, column- and row-level authorization for SQL statements.
//!
//! Statements are parsed, checked against a user's permission list and, when
//! row conditions apply, rewritten before they reach the storage engine.
#![warn(missing_docs)]

/// Table and column extraction from parsed statements.
pub mod analyzer;
/// JSON runtime configuration.
pub mod config;
/// Error types shared by every layer.
pub mod error;
/// Execution engines and the authorizing connection wrapper.
pub mod executor;
/// Permission and role value types.
pub mod model;
/// SQL parsing, rendering and identifier helpers.
pub mod parser;
/// Statement authorization pipeline.
pub mod pipeline;
/// Decision engine, grant/revoke and roles.
pub mod rbac;
/// Row-condition injection.
pub mod rewriter;
/// Session issuance and validation.
pub mod session;
/// Authorization store contract and backends.
pub mod store;
