/// Table and column extraction from parsed statements.
pub mod extract;
/// CTE name scoping shared by the analyzer and the rewriter.
pub(crate) mod scope;
/// Analysis result types.
pub mod statement;
