use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::parser::names::{normalize_identifier, normalize_relation_name};

/// Prefix written in front of a row condition to mark the record as revoked.
///
/// The original condition text is kept after the prefix so a revoked rule stays
/// auditable and can be re-activated.
pub const REVOKED_PREFIX: &str = "REVOKED:";

/// Table or column value matching every table or column.
pub const WILDCARD: &str = "*";

/// Granularity of a permission record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Whole-table access.
    Table,
    /// Access to a single column of a table.
    Column,
    /// Access to the rows of a table matching a SQL predicate.
    Row,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Table => write!(f, "table"),
            Scope::Column => write!(f, "column"),
            Scope::Row => write!(f, "row"),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(Scope::Table),
            "column" => Ok(Scope::Column),
            "row" => Ok(Scope::Row),
            other => Err(format!("unknown permission scope: {other}")),
        }
    }
}

/// Database action a permission applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// `SELECT`
    Select,
    /// `INSERT`
    Insert,
    /// `UPDATE`
    Update,
    /// `DELETE`
    Delete,
    /// `CREATE TABLE`
    Create,
    /// `DROP TABLE`
    Drop,
    /// `ALTER TABLE`
    Alter,
}

impl Action {
    /// All actions, in declaration order.
    pub const ALL: [Action; 7] = [
        Action::Select,
        Action::Insert,
        Action::Update,
        Action::Delete,
        Action::Create,
        Action::Drop,
        Action::Alter,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Select => write!(f, "SELECT"),
            Action::Insert => write!(f, "INSERT"),
            Action::Update => write!(f, "UPDATE"),
            Action::Delete => write!(f, "DELETE"),
            Action::Create => write!(f, "CREATE"),
            Action::Drop => write!(f, "DROP"),
            Action::Alter => write!(f, "ALTER"),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(Action::Select),
            "insert" => Ok(Action::Insert),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "create" => Ok(Action::Create),
            "drop" => Ok(Action::Drop),
            "alter" => Ok(Action::Alter),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// A single grant record in a user's permission list.
///
/// Row-scope records carry a SQL predicate in `condition`; a record whose
/// condition starts with [`REVOKED_PREFIX`] is a tombstone. Column-scope
/// records name their column in `column`. Role membership is stored as a
/// table-scope record whose `table` is the role name (see
/// [`Permission::role_membership`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// Permission granularity.
    pub scope: Scope,
    /// Target table, or [`WILDCARD`].
    pub table: String,
    /// Target column for column-scope records, or [`WILDCARD`]; empty otherwise.
    #[serde(default)]
    pub column: String,
    /// Action the record grants.
    pub action: Action,
    /// Row predicate for row-scope records; empty otherwise.
    #[serde(default)]
    pub condition: String,
}

impl Permission {
    /// Table-scope grant.
    pub fn table(table: impl Into<String>, action: Action) -> Self {
        Self {
            scope: Scope::Table,
            table: table.into(),
            column: String::new(),
            action,
            condition: String::new(),
        }
    }

    /// Column-scope grant.
    pub fn column(table: impl Into<String>, column: impl Into<String>, action: Action) -> Self {
        Self {
            scope: Scope::Column,
            table: table.into(),
            column: column.into(),
            action,
            condition: String::new(),
        }
    }

    /// Row-scope grant restricted by `condition`.
    pub fn row(table: impl Into<String>, condition: impl Into<String>, action: Action) -> Self {
        Self {
            scope: Scope::Row,
            table: table.into(),
            column: String::new(),
            action,
            condition: condition.into(),
        }
    }

    /// Membership marker for `role`.
    ///
    /// Stored as a table-scope record in the user's permission list, so a role
    /// name must not collide with a table name.
    pub fn role_membership(role: impl Into<String>) -> Self {
        Self::table(role, Action::Select)
    }

    /// Parse the compact `table`, `table.column` or `table.column<=value` notation.
    ///
    /// The third form yields a row-scope record with condition `column <= value`.
    pub fn parse(notation: &str, action: Action) -> Result<Self, String> {
        let parts: Vec<&str> = notation.split('.').map(str::trim).collect();
        match parts.as_slice() {
            [table] if !table.is_empty() => Ok(Self::table(*table, action)),
            [table, column] if column.contains("<=") => {
                let (column, bound) = split_row_bound(column, notation)?;
                Ok(Self::row(*table, format!("{column} <= {bound}"), action))
            }
            [table, column] if !table.is_empty() && !column.is_empty() => {
                Ok(Self::column(*table, *column, action))
            }
            [table, column, bound] if bound.contains("<=") && !table.is_empty() => {
                let (_, bound) = split_row_bound(bound, notation)?;
                Ok(Self::row(*table, format!("{column} <= {bound}"), action))
            }
            _ => Err(format!("invalid permission format: {notation}")),
        }
    }

    /// True for records whose table is [`WILDCARD`] or names `table`.
    pub fn matches_table(&self, table: &str) -> bool {
        self.table == WILDCARD || normalize_relation_name(&self.table) == normalize_relation_name(table)
    }

    /// True for records whose column is [`WILDCARD`] or names `column`.
    pub fn matches_column(&self, column: &str) -> bool {
        self.column == WILDCARD || normalize_identifier(&self.column) == normalize_identifier(column)
    }

    /// True when this record is the membership marker for `role`.
    ///
    /// A wildcard table grant is never a membership marker.
    pub fn is_membership_of(&self, role: &str) -> bool {
        self.scope == Scope::Table
            && self.table != WILDCARD
            && normalize_relation_name(&self.table) == normalize_relation_name(role)
    }

    /// True when the condition carries the revocation prefix.
    pub fn is_revoked(&self) -> bool {
        self.condition.starts_with(REVOKED_PREFIX)
    }

    /// The predicate of a live row grant.
    ///
    /// `None` for tombstones and for records without a condition: a row record
    /// without a condition never grants anything.
    pub fn active_condition(&self) -> Option<&str> {
        if self.is_revoked() {
            return None;
        }
        let condition = self.condition.trim();
        (!condition.is_empty()).then_some(condition)
    }

    /// The condition text with any revocation prefix removed.
    pub fn recorded_condition(&self) -> &str {
        self.condition
            .strip_prefix(REVOKED_PREFIX)
            .unwrap_or(&self.condition)
    }

    /// Mark the record as revoked, keeping its condition text.
    pub fn tombstone(&mut self) {
        if !self.is_revoked() {
            self.condition = format!("{REVOKED_PREFIX}{}", self.condition);
        }
    }
}

fn split_row_bound<'a>(part: &'a str, notation: &str) -> Result<(&'a str, &'a str), String> {
    let mut pieces = part.split("<=");
    match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(column), Some(bound), None) if !bound.trim().is_empty() => {
            Ok((column.trim(), bound.trim()))
        }
        _ => Err(format!("invalid row permission format: {notation}")),
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Scope::Table => write!(f, "{} ON {}", self.action, self.table),
            Scope::Column => write!(f, "{} ON {}.{}", self.action, self.table, self.column),
            Scope::Row => write!(
                f,
                "{} ON {} WHERE {}",
                self.action, self.table, self.condition
            ),
        }
    }
}

/// Outcome of the row-level check for one matching record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRule {
    /// Whether the record grants access.
    pub granted: bool,
    /// Predicate the rows must satisfy when granted.
    pub condition: Option<String>,
}

impl RowRule {
    /// The synthesized rule returned when no row record matches.
    pub fn denied() -> Self {
        Self {
            granted: false,
            condition: None,
        }
    }
}

impl From<&Permission> for RowRule {
    /// Tombstones never grant; a row record grants only with a live condition.
    fn from(permission: &Permission) -> Self {
        let condition = permission.active_condition().map(ToString::to_string);
        let granted = match permission.scope {
            Scope::Row => condition.is_some(),
            Scope::Table | Scope::Column => !permission.is_revoked(),
        };
        Self { granted, condition }
    }
}
