use std::ops::ControlFlow;

use sqlparser::ast::{
    AlterTableOperation, AssignmentTarget, CreateTable, Delete, FromTable, Insert, ObjectName,
    ObjectType, Query, SelectItem, SetExpr, Statement, TableFactor, TableObject, TableWithJoins,
    Visit, Visitor,
};
use tracing::debug;

use super::scope::CteScopes;
use super::statement::{AnalyzedStatement, ColumnRef, StatementKind, TableRef};
use crate::error::{AuthzError, Result};
use crate::parser::expr::referenced_columns;
use crate::parser::names::{normalize_ident, normalize_relation_name, qualified_column, relation_of};

/// Walks a statement collecting table factors and projection columns.
///
/// A factor naming a CTE bound around it is skipped; the same name anywhere
/// else is collected as a table.
#[derive(Default)]
struct Collector {
    tables: Vec<TableRef>,
    scopes: CteScopes,
    columns: Vec<ColumnRef>,
    statements: usize,
}

impl Visitor for Collector {
    type Break = ();

    fn pre_visit_statement(&mut self, _statement: &Statement) -> ControlFlow<Self::Break> {
        self.statements += 1;
        ControlFlow::Continue(())
    }

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        self.scopes.enter(query);
        self.collect_table_bodies(&query.body);
        collect_projection(&query.body, &mut self.columns);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.scopes.exit();
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        if let TableFactor::Table { name, alias, .. } = factor {
            let table = TableRef {
                name: relation_of(name),
                alias: alias.as_ref().map(|a| normalize_ident(&a.name)),
            };
            if !self.scopes.is_cte(&table.name) {
                self.tables.push(table);
            }
        }
        ControlFlow::Continue(())
    }
}

impl Collector {
    fn run(statement: &Statement) -> Self {
        let mut collector = Self::default();
        let _ = statement.visit(&mut collector);
        collector
    }

    /// `TABLE name` query bodies read a table without a table factor.
    fn collect_table_bodies(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Table(table) => {
                if let Some(name) = &table.table_name {
                    let name = normalize_relation_name(name);
                    if !self.scopes.is_cte(&name) {
                        self.tables.push(TableRef::new(&name));
                    }
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.collect_table_bodies(left);
                self.collect_table_bodies(right);
            }
            _ => {}
        }
    }

    /// Collected factors minus one occurrence of each `claimed` target,
    /// without repeats.
    fn sources(&self, claimed: &[TableRef]) -> Vec<TableRef> {
        let mut remaining = self.tables.clone();
        for target in claimed {
            if let Some(pos) = remaining.iter().position(|t| t == target) {
                remaining.remove(pos);
            }
        }
        let mut sources: Vec<TableRef> = Vec::with_capacity(remaining.len());
        for table in remaining {
            if !sources.contains(&table) {
                sources.push(table);
            }
        }
        sources
    }
}

fn collect_projection(body: &SetExpr, out: &mut Vec<ColumnRef>) {
    match body {
        SetExpr::Select(select) => {
            for item in &select.projection {
                match item {
                    SelectItem::Wildcard(_) => out.push(ColumnRef::wildcard(None)),
                    SelectItem::QualifiedWildcard(kind, _) => {
                        out.push(ColumnRef::wildcard(Some(&kind.to_string())));
                    }
                    SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                        out.extend(
                            referenced_columns(expr)
                                .iter()
                                .map(|(q, c)| ColumnRef::new(q.as_deref(), c)),
                        );
                    }
                }
            }
        }
        SetExpr::SetOperation { left, right, .. } => {
            collect_projection(left, out);
            collect_projection(right, out);
        }
        _ => {}
    }
}

/// Column named by an assignment target such as `total` or `o.total`.
fn assigned_column(name: &ObjectName) -> ColumnRef {
    let (qualifier, column) = qualified_column(&name.to_string());
    ColumnRef::new(qualifier.as_deref(), &column)
}

fn insert_target(insert: &Insert) -> Result<TableRef> {
    match &insert.table {
        TableObject::TableName(name) => Ok(TableRef {
            name: relation_of(name),
            alias: insert.table_alias.as_ref().map(normalize_ident),
        }),
        other => Err(AuthzError::UnsupportedStatement(format!(
            "INSERT into {other}"
        ))),
    }
}

/// Table factor directly named by a `FROM` entry, not its joins.
fn relation_target(item: &TableWithJoins) -> Option<TableRef> {
    match &item.relation {
        TableFactor::Table { name, alias, .. } => Some(TableRef {
            name: relation_of(name),
            alias: alias.as_ref().map(|a| normalize_ident(&a.name)),
        }),
        _ => None,
    }
}

fn delete_targets(delete: &Delete) -> Vec<TableRef> {
    let (FromTable::WithFromKeyword(items) | FromTable::WithoutKeyword(items)) = &delete.from;
    items.iter().filter_map(relation_target).collect()
}

fn unsupported(statement: &Statement) -> AuthzError {
    let rendered = statement.to_string();
    let keyword = rendered
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase();
    AuthzError::UnsupportedStatement(keyword)
}

fn build(
    kind: StatementKind,
    targets: Vec<TableRef>,
    sources: Vec<TableRef>,
    columns: Vec<ColumnRef>,
    source_columns: Vec<ColumnRef>,
) -> AnalyzedStatement {
    let mut tables: Vec<TableRef> = Vec::with_capacity(targets.len() + sources.len());
    for table in targets.iter().chain(&sources) {
        if !tables.contains(table) {
            tables.push(table.clone());
        }
    }
    AnalyzedStatement {
        kind,
        tables,
        targets,
        sources,
        columns,
        source_columns,
    }
}

/// Extract the tables and columns `statement` touches.
///
/// Tables are split into the targets a statement writes or defines and the
/// sources it reads, including those in subqueries, joins, set-operation
/// branches, `INSERT ... SELECT` and `CREATE TABLE ... AS` queries. Columns
/// are collected only where a column check applies: projections, the explicit
/// column list for `INSERT`, assignment targets for `UPDATE`, and declared
/// columns for DDL. A data-modifying statement nested in a query, such as
/// `WITH ... DELETE`, is unsupported.
pub fn analyze(statement: &Statement) -> Result<AnalyzedStatement> {
    let collector = Collector::run(statement);
    if collector.statements > 1 {
        return Err(AuthzError::UnsupportedStatement(
            "data-modifying statement inside a query".to_string(),
        ));
    }

    let analysis = match statement {
        Statement::Query(_) => build(
            StatementKind::Select,
            Vec::new(),
            collector.sources(&[]),
            collector.columns.clone(),
            Vec::new(),
        ),
        Statement::Insert(insert) => build(
            StatementKind::Insert,
            vec![insert_target(insert)?],
            collector.sources(&[]),
            insert
                .columns
                .iter()
                .map(|c| ColumnRef::new(None, &c.value))
                .collect(),
            collector.columns.clone(),
        ),
        Statement::Update {
            table, assignments, ..
        } => {
            let targets: Vec<TableRef> = relation_target(table).into_iter().collect();
            build(
                StatementKind::Update,
                targets.clone(),
                collector.sources(&targets),
                assignments
                    .iter()
                    .flat_map(|a| match &a.target {
                        AssignmentTarget::ColumnName(name) => vec![assigned_column(name)],
                        AssignmentTarget::Tuple(names) => {
                            names.iter().map(assigned_column).collect()
                        }
                    })
                    .collect(),
                collector.columns.clone(),
            )
        }
        Statement::Delete(delete) => {
            let targets = delete_targets(delete);
            build(
                StatementKind::Delete,
                targets.clone(),
                collector.sources(&targets),
                Vec::new(),
                collector.columns.clone(),
            )
        }
        Statement::CreateTable(CreateTable { name, columns, .. }) => build(
            StatementKind::CreateTable,
            vec![TableRef::new(&relation_of(name))],
            collector.sources(&[]),
            columns
                .iter()
                .map(|c| ColumnRef::new(None, &c.name.value))
                .collect(),
            collector.columns.clone(),
        ),
        Statement::AlterTable {
            name, operations, ..
        } => build(
            StatementKind::AlterTable,
            vec![TableRef::new(&relation_of(name))],
            Vec::new(),
            operations
                .iter()
                .filter_map(|op| match op {
                    AlterTableOperation::AddColumn { column_def, .. } => {
                        Some(ColumnRef::new(None, &column_def.name.value))
                    }
                    AlterTableOperation::RenameColumn {
                        new_column_name, ..
                    } => Some(ColumnRef::new(None, &new_column_name.value)),
                    AlterTableOperation::AlterColumn { column_name, .. } => {
                        Some(ColumnRef::new(None, &column_name.value))
                    }
                    _ => None,
                })
                .collect(),
            Vec::new(),
        ),
        Statement::Drop {
            object_type: ObjectType::Table,
            names,
            ..
        } => build(
            StatementKind::DropTable,
            names
                .iter()
                .map(|n| TableRef::new(&relation_of(n)))
                .collect(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        ),
        other => return Err(unsupported(other)),
    };

    debug!(
        kind = %analysis.kind,
        targets = analysis.targets.len(),
        sources = analysis.sources.len(),
        columns = analysis.columns.len(),
        "statement analyzed"
    );
    Ok(analysis)
}
