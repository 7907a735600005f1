use crate::config::ColumnMatching;
use crate::model::permission::{Action, Permission, RowRule, Scope};

/// Outcome of the row-level check for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAccess {
    /// No row-level record exists; the table grant alone decides.
    Unrestricted,
    /// Rows must satisfy every listed condition, oldest grant first.
    Restricted(Vec<String>),
    /// A row-level record exists but its latest state does not grant.
    Denied,
}

/// One user's permission list, read once and evaluated many times.
///
/// `action: None` matches records of any action.
#[derive(Debug, Clone)]
pub struct UserPermissions {
    user: String,
    records: Vec<Permission>,
    column_matching: ColumnMatching,
}

impl UserPermissions {
    /// Wrap a fetched permission list.
    pub fn new(user: impl Into<String>, records: Vec<Permission>, column_matching: ColumnMatching) -> Self {
        Self {
            user: user.into(),
            records,
            column_matching,
        }
    }

    /// Owner of the list.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[Permission] {
        &self.records
    }

    fn matching<'a>(
        &'a self,
        table: &'a str,
        scope: Scope,
        action: Option<Action>,
    ) -> impl DoubleEndedIterator<Item = &'a Permission> + 'a {
        self.records.iter().filter(move |p| {
            p.scope == scope && action.map_or(true, |a| p.action == a) && p.matches_table(table)
        })
    }

    /// Any live record of `scope` names `table` or `*`.
    pub fn has_table_permission(&self, table: &str, scope: Scope, action: Option<Action>) -> bool {
        self.matching(table, scope, action).any(|p| !p.is_revoked())
    }

    /// Any live record of `scope` for `table` grants `column`.
    ///
    /// Under [`ColumnMatching::TableOnly`] the record's column is ignored;
    /// under [`ColumnMatching::Strict`] a column-scope record must also name
    /// `column` or `*`.
    pub fn has_column_permission(
        &self,
        table: &str,
        column: &str,
        scope: Scope,
        action: Option<Action>,
    ) -> bool {
        self.matching(table, scope, action)
            .filter(|p| !p.is_revoked())
            .any(|p| self.column_record_grants(p, column))
    }

    fn column_record_grants(&self, permission: &Permission, column: &str) -> bool {
        match self.column_matching {
            ColumnMatching::TableOnly => true,
            ColumnMatching::Strict => {
                permission.scope != Scope::Column || permission.matches_column(column)
            }
        }
    }

    /// Row rules for `table`, newest record first.
    ///
    /// Never empty: with no matching record a single denied rule is returned.
    pub fn row_rules(&self, table: &str, scope: Scope, action: Option<Action>) -> Vec<RowRule> {
        let rules: Vec<RowRule> = self
            .matching(table, scope, action)
            .rev()
            .map(RowRule::from)
            .collect();
        if rules.is_empty() {
            vec![RowRule::denied()]
        } else {
            rules
        }
    }

    /// Row-level decision for `table`.
    pub fn row_access(&self, table: &str, action: Option<Action>) -> RowAccess {
        let records: Vec<&Permission> = self.matching(table, Scope::Row, action).collect();
        let Some(newest) = records.last() else {
            return RowAccess::Unrestricted;
        };
        if !RowRule::from(*newest).granted {
            return RowAccess::Denied;
        }
        RowAccess::Restricted(
            records
                .iter()
                .filter_map(|p| p.active_condition().map(ToString::to_string))
                .collect(),
        )
    }

    /// Table grant present and not narrowed to nothing by row-level records.
    pub fn check_query(&self, table: &str, action: Option<Action>) -> bool {
        self.has_table_permission(table, Scope::Table, action)
            && self.row_access(table, action) != RowAccess::Denied
    }

    /// Column check used by the pipeline.
    ///
    /// Column-scope records restrict only once one exists for `table` and
    /// `action`; until then the table grant covers every column.
    pub fn column_allowed(&self, table: &str, column: &str, action: Action) -> bool {
        let mut records = self
            .matching(table, Scope::Column, Some(action))
            .filter(|p| !p.is_revoked())
            .peekable();
        if records.peek().is_none() {
            return true;
        }
        records.any(|p| self.column_record_grants(p, column))
    }

    /// The user holds the membership record for `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.records.iter().any(|p| p.is_membership_of(role))
    }
}
