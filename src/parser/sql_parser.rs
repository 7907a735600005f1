use sqlparser::ast::{Expr, Statement};
use sqlparser::dialect::{dialect_from_str, Dialect, SQLiteDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::error::{AuthzError, Result};

/// Adapter over `sqlparser` for one SQL dialect.
///
/// Holds the dialect by name so the adapter stays `Send + Sync`; a fresh
/// dialect value is built for each parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlParser {
    dialect: String,
}

impl Default for SqlParser {
    fn default() -> Self {
        Self {
            dialect: "sqlite".to_string(),
        }
    }
}

impl SqlParser {
    /// Build a parser for a dialect name accepted by `sqlparser`
    /// (`sqlite`, `postgres`, `mysql`, `generic`, ...).
    pub fn new(dialect: &str) -> Result<Self> {
        let dialect = dialect.trim().to_ascii_lowercase();
        if dialect_from_str(&dialect).is_none() {
            return Err(AuthzError::Config(format!("unknown SQL dialect: {dialect}")));
        }
        Ok(Self { dialect })
    }

    /// Name of the configured dialect.
    pub fn dialect_name(&self) -> &str {
        &self.dialect
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        dialect_from_str(&self.dialect).unwrap_or_else(|| Box::new(SQLiteDialect {}))
    }

    /// Parse text holding exactly one statement.
    ///
    /// Empty input is a parse error; more than one statement is unsupported.
    pub fn parse(&self, sql: &str) -> Result<Statement> {
        let dialect = self.dialect();
        let mut statements = Parser::parse_sql(dialect.as_ref(), sql)?;
        match statements.len() {
            0 => Err(AuthzError::Parse("no SQL statement found".to_string())),
            1 => Ok(statements.remove(0)),
            n => Err(AuthzError::UnsupportedStatement(format!(
                "expected a single statement, found {n}"
            ))),
        }
    }

    /// Parse a standalone boolean predicate such as a stored row condition.
    ///
    /// Anything after the expression (a `;`, a second statement) is rejected.
    pub fn parse_condition(&self, condition: &str) -> Result<Expr> {
        let dialect = self.dialect();
        let mut parser = Parser::new(dialect.as_ref()).try_with_sql(condition)?;
        let expr = parser.parse_expr()?;
        let next = parser.peek_token();
        if next.token != Token::EOF {
            return Err(AuthzError::Parse(format!(
                "unexpected {} after condition `{expr}`",
                next.token
            )));
        }
        Ok(expr)
    }

    /// Render a statement back to SQL text.
    pub fn render(&self, statement: &Statement) -> String {
        statement.to_string()
    }
}
