use std::collections::HashSet;
use std::ops::ControlFlow;

use sqlparser::ast::{visit_expressions, visit_expressions_mut, BinaryOperator, Expr, Ident};

use super::names::normalize_ident;

/// Split an identifier expression into `(qualifier, column)`.
///
/// The qualifier is the part right before the column (`o` in `o.user_id`,
/// `orders` in `main.orders.user_id`).
pub fn split_column_reference(expr: &Expr) -> Option<(Option<String>, String)> {
    match expr {
        Expr::Identifier(ident) => Some((None, ident.value.clone())),
        Expr::CompoundIdentifier(parts) => {
            let (column, rest) = parts.split_last()?;
            Some((rest.last().map(|q| q.value.clone()), column.value.clone()))
        }
        _ => None,
    }
}

/// Every column reference appearing anywhere inside `expr`, in visit order.
pub fn referenced_columns(expr: &Expr) -> Vec<(Option<String>, String)> {
    let mut columns = Vec::new();
    let _ = visit_expressions(expr, |e| {
        if let Some(column) = split_column_reference(e) {
            columns.push(column);
        }
        ControlFlow::<()>::Continue(())
    });
    columns
}

/// Remove any number of redundant parentheses around `expr`.
pub fn strip_nested(mut expr: &Expr) -> &Expr {
    while let Expr::Nested(inner) = expr {
        expr = inner;
    }
    expr
}

/// Flatten a predicate into its top-level `AND` operands.
pub fn conjuncts(expr: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    collect_conjuncts(expr, &mut out);
    out
}

fn collect_conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match strip_nested(expr) {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        other => out.push(other),
    }
}

/// Canonical text of every top-level conjunct of `expr`.
pub fn conjunct_keys(expr: &Expr) -> HashSet<String> {
    conjuncts(expr).into_iter().map(ToString::to_string).collect()
}

/// Join two predicates with `AND`.
pub fn and(left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op: BinaryOperator::And,
        right: Box::new(right),
    }
}

/// Wrap `expr` in parentheses unless it already is.
pub fn parenthesize(expr: Expr) -> Expr {
    match expr {
        Expr::Nested(_) => expr,
        other => Expr::Nested(Box::new(other)),
    }
}

/// Prefix bare references to any of `columns` with `qualifier`.
///
/// Already-qualified references are left untouched.
pub fn qualify_columns(expr: &mut Expr, qualifier: &str, columns: &[String]) {
    let _ = visit_expressions_mut(expr, |e| {
        if let Expr::Identifier(ident) = e {
            if columns.iter().any(|c| *c == normalize_ident(ident)) {
                *e = Expr::CompoundIdentifier(vec![Ident::new(qualifier), ident.clone()]);
            }
        }
        ControlFlow::<()>::Continue(())
    });
}
