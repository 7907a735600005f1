use std::collections::HashSet;
use std::ops::ControlFlow;

use sqlparser::ast::{
    Delete, Expr, FromTable, Query, Select, SetExpr, Statement, TableFactor, TableWithJoins,
    Visit, Visitor, VisitorMut,
};

use super::security::Access;
use crate::analyzer::scope::CteScopes;
use crate::parser::expr::{and, conjunct_keys, parenthesize, qualify_columns};
use crate::parser::names::{normalize_relation_name, relation_of};

/// A parsed row condition bound to a normalized table name.
pub(crate) struct BoundCondition {
    pub(crate) table: String,
    pub(crate) predicate: Expr,
    pub(crate) access: Access,
}

/// Conjoins row conditions into every filter clause that reads a
/// conditioned table.
///
/// Queries are handled bottom-up, so subqueries, derived tables, CTE bodies
/// and set-operation branches each receive the conditions of the tables in
/// their own `FROM` clause. References to a CTE are left alone. Tables read
/// where no filter can be attached are recorded in `unfiltered`.
pub(crate) struct Injector<'a> {
    pub(crate) conditions: &'a [BoundCondition],
    pub(crate) identity_columns: &'a [String],
    pub(crate) scopes: CteScopes,
    pub(crate) injected: usize,
    pub(crate) unfiltered: Vec<String>,
}

impl VisitorMut for Injector<'_> {
    type Break = ();

    fn pre_visit_query(&mut self, query: &mut Query) -> ControlFlow<Self::Break> {
        self.scopes.enter(query);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, query: &mut Query) -> ControlFlow<Self::Break> {
        self.inject_set_expr(&mut query.body);
        self.scopes.exit();
        ControlFlow::Continue(())
    }

    fn post_visit_statement(&mut self, statement: &mut Statement) -> ControlFlow<Self::Break> {
        match statement {
            Statement::Update {
                table,
                from,
                selection,
                ..
            } => {
                let mut targets =
                    tagged(relation_targets(std::slice::from_ref(table)), Access::Write);
                targets.extend(tagged(top_level_targets(&table.joins), Access::Read));
                targets.extend(tagged(top_level_targets(&*from), Access::Read));
                self.inject_filter(selection, &targets);
            }
            Statement::Delete(Delete {
                from,
                using,
                selection,
                ..
            }) => {
                let tables = match from {
                    FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => {
                        tables
                    }
                };
                let mut targets = tagged(relation_targets(tables), Access::Write);
                for item in tables.iter() {
                    targets.extend(tagged(top_level_targets(&item.joins), Access::Read));
                }
                targets.extend(tagged(top_level_targets(&*using), Access::Read));
                self.inject_filter(selection, &targets);
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

impl Injector<'_> {
    fn inject_set_expr(&mut self, body: &mut SetExpr) {
        match body {
            SetExpr::Select(select) => self.inject_select(select),
            SetExpr::SetOperation { left, right, .. } => {
                self.inject_set_expr(left);
                self.inject_set_expr(right);
            }
            SetExpr::Table(table) => {
                if let Some(name) = &table.table_name {
                    let name = normalize_relation_name(name);
                    if !self.scopes.is_cte(&name) && self.applies(&name, Access::Read) {
                        self.unfiltered.push(name);
                    }
                }
            }
            _ => {}
        }
    }

    fn inject_select(&mut self, select: &mut Select) {
        let mut targets = Vec::new();
        for item in &select.from {
            push_targets(item, &mut targets);
        }
        targets.retain(|t| !self.scopes.is_cte(&t.table));
        self.inject_filter(&mut select.selection, &tagged(targets, Access::Read));
    }

    fn applies(&self, table: &str, access: Access) -> bool {
        self.conditions
            .iter()
            .any(|c| c.table == table && c.access.covers(access))
    }

    fn inject_filter(&mut self, filter: &mut Option<Expr>, targets: &[(Target, Access)]) {
        let additions = self.conditions_for(targets);
        if additions.is_empty() {
            return;
        }
        let (combined, added) = combine(filter.take(), additions);
        *filter = combined;
        self.injected += added;
    }

    /// Conditions for `targets` in table order, alias-qualified.
    fn conditions_for(&self, targets: &[(Target, Access)]) -> Vec<Expr> {
        let mut out = Vec::new();
        for (target, access) in targets {
            let matching = self
                .conditions
                .iter()
                .filter(|c| c.table == target.table && c.access.covers(*access));
            for bound in matching {
                let mut predicate = bound.predicate.clone();
                if let Some(alias) = &target.alias {
                    qualify_columns(&mut predicate, alias, self.identity_columns);
                }
                out.push(predicate);
            }
        }
        out
    }
}

/// A table read by one `FROM` clause, with the alias it is visible under.
struct Target {
    table: String,
    alias: Option<String>,
}

fn tagged(targets: Vec<Target>, access: Access) -> Vec<(Target, Access)> {
    targets.into_iter().map(|t| (t, access)).collect()
}

/// The relation of each `FROM` entry, without its joins.
fn relation_targets(items: &[TableWithJoins]) -> Vec<Target> {
    let mut out = Vec::new();
    for item in items {
        push_factor(&item.relation, &mut out);
    }
    out
}

/// Table factors in `node` that are not inside a nested query.
struct TopLevelFactors {
    depth: usize,
    found: Vec<Target>,
}

impl Visitor for TopLevelFactors {
    type Break = ();

    fn pre_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.depth -= 1;
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        if self.depth == 0 && matches!(factor, TableFactor::Table { .. }) {
            push_factor(factor, &mut self.found);
        }
        ControlFlow::Continue(())
    }
}

fn top_level_targets<V: Visit>(node: &V) -> Vec<Target> {
    let mut factors = TopLevelFactors {
        depth: 0,
        found: Vec::new(),
    };
    let _ = node.visit(&mut factors);
    factors.found
}

fn push_targets(item: &TableWithJoins, out: &mut Vec<Target>) {
    push_factor(&item.relation, out);
    for join in &item.joins {
        push_factor(&join.relation, out);
    }
}

fn push_factor(factor: &TableFactor, out: &mut Vec<Target>) {
    match factor {
        TableFactor::Table { name, alias, .. } => out.push(Target {
            table: relation_of(name),
            alias: alias.as_ref().map(|a| a.name.value.clone()),
        }),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => push_targets(table_with_joins, out),
        _ => {}
    }
}

/// Merge `additions` into `existing`, skipping any condition whose conjuncts
/// are all present already.
///
/// Returns the new filter and the number of conditions actually added.
pub(crate) fn combine(existing: Option<Expr>, additions: Vec<Expr>) -> (Option<Expr>, usize) {
    let mut present: HashSet<String> = existing.as_ref().map(conjunct_keys).unwrap_or_default();
    let mut fresh = Vec::new();
    for condition in additions {
        let keys = conjunct_keys(&condition);
        if keys.is_subset(&present) {
            continue;
        }
        present.extend(keys);
        fresh.push(condition);
    }

    let added = fresh.len();
    if added == 0 {
        return (existing, 0);
    }
    if existing.is_none() && added == 1 {
        return (fresh.pop(), 1);
    }
    let combined = existing
        .into_iter()
        .chain(fresh)
        .map(parenthesize)
        .reduce(and);
    (combined, added)
}
