use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::permission::{Action, WILDCARD};
use crate::parser::names::{normalize_identifier, normalize_relation_name};

/// Statement shapes the analyzer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// `SELECT`, including set operations and CTEs.
    Select,
    /// `INSERT INTO`
    Insert,
    /// `UPDATE`
    Update,
    /// `DELETE FROM`
    Delete,
    /// `CREATE TABLE`
    CreateTable,
    /// `ALTER TABLE`
    AlterTable,
    /// `DROP TABLE`
    DropTable,
}

impl StatementKind {
    /// Action the statement needs on each referenced table.
    pub fn action(self) -> Action {
        match self {
            StatementKind::Select => Action::Select,
            StatementKind::Insert => Action::Insert,
            StatementKind::Update => Action::Update,
            StatementKind::Delete => Action::Delete,
            StatementKind::CreateTable => Action::Create,
            StatementKind::AlterTable => Action::Alter,
            StatementKind::DropTable => Action::Drop,
        }
    }

    /// Whether column-level checks apply.
    pub fn checks_columns(self) -> bool {
        matches!(
            self,
            StatementKind::Select | StatementKind::Insert | StatementKind::Update
        )
    }

    /// Whether row conditions on the written table are injected.
    ///
    /// Tables read by any statement always receive their `SELECT` conditions.
    pub fn is_rewritable(self) -> bool {
        matches!(
            self,
            StatementKind::Select | StatementKind::Update | StatementKind::Delete
        )
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Select => write!(f, "SELECT"),
            StatementKind::Insert => write!(f, "INSERT"),
            StatementKind::Update => write!(f, "UPDATE"),
            StatementKind::Delete => write!(f, "DELETE"),
            StatementKind::CreateTable => write!(f, "CREATE TABLE"),
            StatementKind::AlterTable => write!(f, "ALTER TABLE"),
            StatementKind::DropTable => write!(f, "DROP TABLE"),
        }
    }
}

/// A table referenced by the statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    /// Normalized terminal relation name.
    pub name: String,
    /// Normalized alias, when the statement gives one.
    pub alias: Option<String>,
}

impl TableRef {
    /// Reference without alias.
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_relation_name(name),
            alias: None,
        }
    }

    /// Reference under `alias`.
    pub fn aliased(name: &str, alias: &str) -> Self {
        Self {
            name: normalize_relation_name(name),
            alias: Some(normalize_identifier(alias)),
        }
    }
}

/// A column referenced by the statement, or a `*` projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Normalized table name or alias written before the column.
    pub qualifier: Option<String>,
    /// Normalized column name, or `*`.
    pub name: String,
}

impl ColumnRef {
    /// Column reference, normalizing both parts.
    pub fn new(qualifier: Option<&str>, name: &str) -> Self {
        Self {
            qualifier: qualifier.map(normalize_identifier),
            name: normalize_identifier(name),
        }
    }

    /// `*` or `qualifier.*`.
    pub fn wildcard(qualifier: Option<&str>) -> Self {
        Self {
            qualifier: qualifier.map(normalize_relation_name),
            name: WILDCARD.to_string(),
        }
    }

    /// True for `*` projections, which defer to the table-level check.
    pub fn is_wildcard(&self) -> bool {
        self.name == WILDCARD
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{qualifier}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Tables and columns a statement touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedStatement {
    /// Statement shape.
    pub kind: StatementKind,
    /// Every referenced table in discovery order; written tables come first.
    pub tables: Vec<TableRef>,
    /// Tables the statement writes or defines. Empty for `SELECT`.
    pub targets: Vec<TableRef>,
    /// Tables the statement only reads: every table of a `SELECT`, and the
    /// queries, joins, `FROM`/`USING` lists and subqueries of a write.
    pub sources: Vec<TableRef>,
    /// Columns checked with the statement's own action: the projection of a
    /// `SELECT`, or the written columns of a write. Empty when no column
    /// check applies.
    pub columns: Vec<ColumnRef>,
    /// Projection columns of queries nested inside a write, checked for
    /// `SELECT` against the sources.
    pub source_columns: Vec<ColumnRef>,
}

fn distinct_names(tables: &[TableRef]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::with_capacity(tables.len());
    for table in tables {
        if !names.contains(&table.name.as_str()) {
            names.push(&table.name);
        }
    }
    names
}

impl AnalyzedStatement {
    /// Distinct table names in discovery order.
    pub fn table_names(&self) -> Vec<&str> {
        distinct_names(&self.tables)
    }

    /// Distinct written table names.
    pub fn target_names(&self) -> Vec<&str> {
        distinct_names(&self.targets)
    }

    /// Distinct read table names.
    pub fn source_names(&self) -> Vec<&str> {
        distinct_names(&self.sources)
    }

    /// Tables the statement-action columns are checked against: the sources
    /// of a `SELECT`, the targets of anything else.
    pub fn column_tables(&self) -> Vec<&str> {
        match self.kind {
            StatementKind::Select => self.source_names(),
            _ => self.target_names(),
        }
    }

    /// Every `(table, action)` pair that needs a table grant, targets first.
    ///
    /// Targets need the statement's action and sources need `SELECT`, so a
    /// table both written and read appears twice.
    pub fn required_grants(&self) -> Vec<(&str, Action)> {
        let action = self.kind.action();
        let mut grants: Vec<(&str, Action)> = Vec::new();
        let pairs = self
            .target_names()
            .into_iter()
            .map(|t| (t, action))
            .chain(self.source_names().into_iter().map(|t| (t, Action::Select)));
        for pair in pairs {
            if !grants.contains(&pair) {
                grants.push(pair);
            }
        }
        grants
    }

    /// The table a qualifier refers to: an alias first, then a table name.
    pub fn resolve(&self, qualifier: &str) -> Option<&TableRef> {
        let qualifier = normalize_identifier(qualifier);
        self.tables
            .iter()
            .find(|t| t.alias.as_deref() == Some(qualifier.as_str()))
            .or_else(|| self.tables.iter().find(|t| t.name == qualifier))
    }

    /// True when a `*` projection is present.
    pub fn has_wildcard(&self) -> bool {
        self.columns.iter().any(ColumnRef::is_wildcard)
    }
}
