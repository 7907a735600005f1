/// SQL expression helpers shared by the analyzer and the rewriter.
pub mod expr;
/// Identifier and table-name normalization helpers (schema-qualified names, quoted identifiers).
pub mod names;
/// Dialect-aware parse/render adapter over `sqlparser`.
pub mod sql_parser;
