use std::sync::Arc;

use sqlparser::ast::Statement;
use tracing::{debug, info, warn};

use super::stage::PipelineStage;
use crate::analyzer::extract::analyze;
use crate::analyzer::statement::{AnalyzedStatement, ColumnRef};
use crate::config::Config;
use crate::error::{AuthzError, Result};
use crate::model::permission::{Action, Scope};
use crate::rbac::engine::{require_name, DecisionEngine};
use crate::rbac::snapshot::UserPermissions;
use crate::rewriter::security::{row_conditions, SecurityRewriter};
use crate::store::backend::AuthorizationStore;

/// A statement cleared for execution.
#[derive(Debug, Clone)]
pub struct Authorized {
    /// Final SQL text to hand to the execution engine.
    pub sql: String,
    /// Final statement, rewritten when row conditions applied.
    pub statement: Statement,
    /// Whether row conditions were injected.
    pub rewritten: bool,
    /// What the analyzer found.
    pub analysis: AnalyzedStatement,
    /// Stages passed, ending with [`PipelineStage::Authorized`].
    pub stages: Vec<PipelineStage>,
}

/// Per-call stage log.
struct Trace<'a> {
    user: &'a str,
    stages: Vec<PipelineStage>,
}

impl<'a> Trace<'a> {
    fn new(user: &'a str, first: PipelineStage) -> Self {
        debug!(user, stage = %first, "pipeline stage");
        Self {
            user,
            stages: vec![first],
        }
    }

    fn advance(&mut self, stage: PipelineStage) {
        debug!(user = self.user, stage = %stage, "pipeline stage");
        self.stages.push(stage);
    }
}

/// Runs analysis, table, column and row checks, then the rewrite, for one
/// statement at a time.
///
/// The pipeline holds no per-call state: the user's permission list is read
/// once per statement and dropped with the decision. The cheapest check runs
/// first and the first failure ends the call.
pub struct AuthorizationPipeline<S> {
    engine: DecisionEngine<S>,
    rewriter: SecurityRewriter,
    detailed_denials: bool,
}

impl<S> Clone for AuthorizationPipeline<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            rewriter: self.rewriter.clone(),
            detailed_denials: self.detailed_denials,
        }
    }
}

impl<S: AuthorizationStore> AuthorizationPipeline<S> {
    /// Pipeline over an engine and rewriter, with detailed denials.
    pub fn new(engine: DecisionEngine<S>, rewriter: SecurityRewriter) -> Self {
        Self {
            engine,
            rewriter,
            detailed_denials: true,
        }
    }

    /// Pipeline configured from `config`.
    pub fn from_config(store: Arc<S>, config: &Config) -> Result<Self> {
        let engine = DecisionEngine::new(store).with_column_matching(config.column_matching);
        let rewriter = SecurityRewriter::from_config(config)?;
        Ok(Self::new(engine, rewriter).with_detailed_denials(config.detailed_denials))
    }

    /// Whether denials name the failing scope.
    pub fn with_detailed_denials(mut self, detailed: bool) -> Self {
        self.detailed_denials = detailed;
        self
    }

    /// The decision engine.
    pub fn engine(&self) -> &DecisionEngine<S> {
        &self.engine
    }

    /// The rewriter.
    pub fn rewriter(&self) -> &SecurityRewriter {
        &self.rewriter
    }

    /// Parse and authorize `sql` for `user`.
    pub fn authorize(&self, user: &str, sql: &str) -> Result<Authorized> {
        require_name("username", user)?;
        let mut trace = Trace::new(user, PipelineStage::Received);
        let statement = self.rewriter.parser().parse(sql)?;
        trace.advance(PipelineStage::Parsed);
        self.run(trace, &statement)
    }

    /// Authorize an already-parsed statement for `user`.
    ///
    /// `statement` is left untouched; a rewritten copy is returned.
    pub fn authorize_statement(&self, user: &str, statement: &Statement) -> Result<Authorized> {
        require_name("username", user)?;
        let trace = Trace::new(user, PipelineStage::Parsed);
        self.run(trace, statement)
    }

    fn run(&self, mut trace: Trace<'_>, statement: &Statement) -> Result<Authorized> {
        let user = trace.user;
        let analysis = analyze(statement)?;
        trace.advance(PipelineStage::Analyzed);

        let permissions = self.engine.snapshot(user)?;
        let action = analysis.kind.action();

        for (table, needed) in analysis.required_grants() {
            if !permissions.has_table_permission(table, Scope::Table, Some(needed)) {
                return Err(self.deny(trace, table, Scope::Table));
            }
        }
        trace.advance(PipelineStage::TableChecked);

        let mut column_checks: Vec<(&ColumnRef, Vec<&str>, Action)> = Vec::new();
        if analysis.kind.checks_columns() {
            let tables = analysis.column_tables();
            column_checks.extend(analysis.columns.iter().map(|c| (c, tables.clone(), action)));
        }
        let sources = analysis.source_names();
        column_checks.extend(
            analysis
                .source_columns
                .iter()
                .map(|c| (c, sources.clone(), Action::Select)),
        );
        for (column, tables, needed) in column_checks {
            if column.is_wildcard() {
                continue;
            }
            if let Err(object) = check_column(&permissions, &analysis, &tables, column, needed) {
                return Err(self.deny(trace, &object, Scope::Column));
            }
        }
        trace.advance(PipelineStage::ColumnChecked);

        let conditions = match row_conditions(&permissions, &analysis) {
            Ok(conditions) => conditions,
            Err(table) => return Err(self.deny(trace, &table, Scope::Row)),
        };
        trace.advance(PipelineStage::RowChecked);

        let final_statement = match self.rewriter.rewrite(statement, &conditions) {
            Ok(rewritten) => rewritten,
            Err(AuthzError::PermissionDenied { object, .. }) => {
                return Err(self.deny(trace, &object, Scope::Row))
            }
            Err(other) => return Err(other),
        };
        let rewritten = final_statement != *statement;
        if rewritten {
            trace.advance(PipelineStage::Rewritten);
        }
        trace.advance(PipelineStage::Authorized);

        let sql = self.rewriter.parser().render(&final_statement);
        info!(user, kind = %analysis.kind, rewritten, "statement authorized");
        Ok(Authorized {
            sql,
            statement: final_statement,
            rewritten,
            analysis,
            stages: trace.stages,
        })
    }

    fn deny(&self, mut trace: Trace<'_>, object: &str, scope: Scope) -> AuthzError {
        trace.advance(PipelineStage::Denied);
        warn!(user = trace.user, object, %scope, "statement denied");
        AuthzError::PermissionDenied {
            object: object.to_string(),
            scope: self.detailed_denials.then_some(scope),
        }
    }
}

/// Column check for one reference against the tables in scope.
///
/// A qualifier that resolves to a table is checked against that table only.
/// An unqualified column, or one qualified by a name that is not a table
/// (a derived-table alias), must be allowed by every table in scope, since
/// the engine may resolve it to any of them. On denial the offending object
/// is returned.
fn check_column(
    permissions: &UserPermissions,
    analysis: &AnalyzedStatement,
    tables: &[&str],
    column: &ColumnRef,
    action: Action,
) -> std::result::Result<(), String> {
    if let Some(table) = column.qualifier.as_deref().and_then(|q| analysis.resolve(q)) {
        if permissions.column_allowed(&table.name, &column.name, action) {
            return Ok(());
        }
        return Err(format!("{}.{}", table.name, column.name));
    }
    match tables
        .iter()
        .find(|table| !permissions.column_allowed(table, &column.name, action))
    {
        Some(table) => Err(format!("{table}.{}", column.name)),
        None => Ok(()),
    }
}
