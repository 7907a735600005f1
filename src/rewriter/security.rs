use serde::{Deserialize, Serialize};
use sqlparser::ast::{Statement, VisitMut};
use tracing::debug;

use super::inject::{BoundCondition, Injector};
use crate::analyzer::extract::analyze;
use crate::analyzer::scope::CteScopes;
use crate::analyzer::statement::AnalyzedStatement;
use crate::config::Config;
use crate::error::{AuthzError, Result};
use crate::model::permission::{Action, Scope};
use crate::parser::names::normalize_relation_name;
use crate::parser::sql_parser::SqlParser;
use crate::rbac::engine::DecisionEngine;
use crate::rbac::snapshot::{RowAccess, UserPermissions};
use crate::store::backend::AuthorizationStore;

/// Which occurrences of a table a row condition is injected for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Every occurrence.
    #[default]
    Any,
    /// Occurrences the statement reads: query blocks, joins, and the
    /// `FROM`/`USING` tables of `UPDATE` and `DELETE`.
    Read,
    /// The table an `UPDATE` or `DELETE` modifies.
    Write,
}

impl Access {
    /// True when a condition tagged `self` applies to an `occurrence`.
    pub fn covers(self, occurrence: Access) -> bool {
        self == Access::Any || self == occurrence
    }
}

/// A row condition to enforce on one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCondition {
    /// Table the condition applies to.
    pub table: String,
    /// SQL boolean expression.
    pub condition: String,
    /// Occurrences of the table the condition is injected for.
    #[serde(default)]
    pub access: Access,
}

impl TableCondition {
    /// Condition `condition` on every occurrence of `table`.
    pub fn new(table: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            condition: condition.into(),
            access: Access::Any,
        }
    }

    /// Condition on the occurrences of `table` that are read.
    pub fn read(table: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            access: Access::Read,
            ..Self::new(table, condition)
        }
    }

    /// Condition on `table` where an `UPDATE` or `DELETE` modifies it.
    pub fn write(table: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            access: Access::Write,
            ..Self::new(table, condition)
        }
    }
}

/// Row conditions `permissions` imposes on an analyzed statement.
///
/// Sources contribute their `SELECT` conditions as [`Access::Read`]. Targets
/// contribute the conditions of the statement's action as [`Access::Write`]
/// when the statement kind filters its written rows. On denial the table
/// whose newest row record does not grant is returned.
pub fn row_conditions(
    permissions: &UserPermissions,
    analysis: &AnalyzedStatement,
) -> std::result::Result<Vec<TableCondition>, String> {
    let action = analysis.kind.action();
    let mut conditions = Vec::new();
    for table in analysis.target_names() {
        match permissions.row_access(table, Some(action)) {
            RowAccess::Unrestricted => {}
            RowAccess::Restricted(found) if analysis.kind.is_rewritable() => conditions.extend(
                found
                    .into_iter()
                    .map(|condition| TableCondition::write(table, condition)),
            ),
            RowAccess::Restricted(_) => {}
            RowAccess::Denied => return Err(table.to_string()),
        }
    }
    for table in analysis.source_names() {
        match permissions.row_access(table, Some(Action::Select)) {
            RowAccess::Unrestricted => {}
            RowAccess::Restricted(found) => conditions.extend(
                found
                    .into_iter()
                    .map(|condition| TableCondition::read(table, condition)),
            ),
            RowAccess::Denied => return Err(table.to_string()),
        }
    }
    Ok(conditions)
}

/// Injects row-level conditions into parsed statements.
///
/// The input statement is never modified; [`rewrite`](Self::rewrite) returns
/// a new value. Every query block (including subqueries, set-operation
/// branches, `INSERT ... SELECT` and `CREATE TABLE ... AS` queries) receives
/// the conditions of the tables in its `FROM` clause, and `UPDATE`/`DELETE`
/// filters receive those of their target, joined, `FROM` and `USING` tables.
/// The rows an `INSERT` writes and DDL are not filtered.
///
/// When a conditioned table is visible under an alias, bare references to an
/// identity column inside its condition are qualified with that alias.
/// Other columns pass through unqualified.
#[derive(Debug, Clone)]
pub struct SecurityRewriter {
    parser: SqlParser,
    identity_columns: Vec<String>,
}

impl Default for SecurityRewriter {
    fn default() -> Self {
        Self {
            parser: SqlParser::default(),
            identity_columns: vec!["user_id".to_string()],
        }
    }
}

impl SecurityRewriter {
    /// Rewriter parsing conditions with `parser` and qualifying the given
    /// identity columns.
    pub fn new(parser: SqlParser, identity_columns: Vec<String>) -> Self {
        Self {
            parser,
            identity_columns,
        }
    }

    /// Rewriter for the dialect and identity columns of `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.parser()?,
            config.normalized_identity_columns(),
        ))
    }

    /// The parser used for conditions and statements.
    pub fn parser(&self) -> &SqlParser {
        &self.parser
    }

    fn bind(&self, conditions: &[TableCondition]) -> Result<Vec<BoundCondition>> {
        conditions
            .iter()
            .map(|c| {
                if c.table.trim().is_empty() {
                    return Err(AuthzError::InvalidInput(
                        "table name cannot be empty".to_string(),
                    ));
                }
                Ok(BoundCondition {
                    table: normalize_relation_name(&c.table),
                    predicate: self.parser.parse_condition(&c.condition)?,
                    access: c.access,
                })
            })
            .collect()
    }

    /// Return `statement` with `conditions` conjoined into its filters.
    ///
    /// Every condition must parse as a single expression. A condition whose
    /// conjuncts already appear in the target filter is not added again, so
    /// rewriting an already-rewritten statement changes nothing. A
    /// conditioned table read by a `TABLE name` query, which has no filter to
    /// extend, is a row-scope denial.
    pub fn rewrite(&self, statement: &Statement, conditions: &[TableCondition]) -> Result<Statement> {
        let mut rewritten = statement.clone();
        if conditions.is_empty() {
            return Ok(rewritten);
        }

        let bound = self.bind(conditions)?;
        let mut injector = Injector {
            conditions: &bound,
            identity_columns: &self.identity_columns,
            scopes: CteScopes::default(),
            injected: 0,
            unfiltered: Vec::new(),
        };
        let _ = rewritten.visit(&mut injector);
        if let Some(table) = injector.unfiltered.first() {
            return Err(AuthzError::denied(table.as_str(), Scope::Row));
        }
        debug!(
            conditions = conditions.len(),
            injected = injector.injected,
            "row conditions injected"
        );
        Ok(rewritten)
    }

    /// Parse `sql`, rewrite it and render the result.
    pub fn rewrite_sql(&self, sql: &str, conditions: &[TableCondition]) -> Result<String> {
        let statement = self.parser.parse(sql)?;
        let rewritten = self.rewrite(&statement, conditions)?;
        Ok(self.parser.render(&rewritten))
    }

    /// Look up `user`'s row conditions for every table `statement` references
    /// and rewrite with them.
    ///
    /// Written tables use the statement's action and read tables use
    /// `SELECT`. A table whose newest row record does not grant is a
    /// row-scope denial.
    pub fn rewrite_for_user<S: AuthorizationStore>(
        &self,
        engine: &DecisionEngine<S>,
        statement: &Statement,
        user: &str,
    ) -> Result<Statement> {
        let analysis = analyze(statement)?;
        let snapshot = engine.snapshot(user)?;
        let conditions = row_conditions(&snapshot, &analysis)
            .map_err(|table| AuthzError::denied(table, Scope::Row))?;
        self.rewrite(statement, &conditions)
    }
}
