use std::sync::Arc;

use tracing::{debug, info};

use super::snapshot::{RowAccess, UserPermissions};
use crate::config::ColumnMatching;
use crate::error::{AuthzError, Result};
use crate::model::permission::{Action, Permission, RowRule, Scope};
use crate::parser::names::normalize_relation_name;
use crate::store::backend::AuthorizationStore;

pub(crate) fn require_name(kind: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AuthzError::InvalidInput(format!("{kind} cannot be empty")));
    }
    Ok(())
}

fn same_table(record: &Permission, table: &str) -> bool {
    normalize_relation_name(&record.table) == normalize_relation_name(table)
}

/// Answers table, column and row questions for a user and owns grant/revoke.
///
/// Nothing is cached: every call reads the user's list from the store, and
/// every change is a single read-modify-write through
/// [`AuthorizationStore::modify_user_permissions`].
pub struct DecisionEngine<S> {
    store: Arc<S>,
    column_matching: ColumnMatching,
}

impl<S> Clone for DecisionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            column_matching: self.column_matching,
        }
    }
}

impl<S: AuthorizationStore> DecisionEngine<S> {
    /// Engine with strict column matching.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            column_matching: ColumnMatching::Strict,
        }
    }

    /// Override the column matching mode.
    pub fn with_column_matching(mut self, column_matching: ColumnMatching) -> Self {
        self.column_matching = column_matching;
        self
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Read the user's permission list once.
    pub fn snapshot(&self, user: &str) -> Result<UserPermissions> {
        require_name("username", user)?;
        let records = self.store.get_user_permissions(user)?;
        Ok(UserPermissions::new(user, records, self.column_matching))
    }

    fn snapshot_for_table(&self, user: &str, table: &str) -> Result<UserPermissions> {
        require_name("table name", table)?;
        self.snapshot(user)
    }

    /// A live record of `scope` names `table` or `*`, for any action.
    pub fn has_table_permission(&self, user: &str, table: &str, scope: Scope) -> Result<bool> {
        Ok(self
            .snapshot_for_table(user, table)?
            .has_table_permission(table, scope, None))
    }

    /// [`has_table_permission`](Self::has_table_permission) restricted to `action`.
    pub fn has_table_permission_for(
        &self,
        user: &str,
        table: &str,
        scope: Scope,
        action: Action,
    ) -> Result<bool> {
        Ok(self
            .snapshot_for_table(user, table)?
            .has_table_permission(table, scope, Some(action)))
    }

    /// A live record of `scope` for `table` grants `column`, for any action.
    pub fn has_column_permission(
        &self,
        user: &str,
        table: &str,
        column: &str,
        scope: Scope,
    ) -> Result<bool> {
        require_name("column name", column)?;
        Ok(self
            .snapshot_for_table(user, table)?
            .has_column_permission(table, column, scope, None))
    }

    /// [`has_column_permission`](Self::has_column_permission) restricted to `action`.
    pub fn has_column_permission_for(
        &self,
        user: &str,
        table: &str,
        column: &str,
        scope: Scope,
        action: Action,
    ) -> Result<bool> {
        require_name("column name", column)?;
        Ok(self
            .snapshot_for_table(user, table)?
            .has_column_permission(table, column, scope, Some(action)))
    }

    /// Row rules for `table`, newest first; never empty.
    pub fn get_row_permissions(&self, user: &str, table: &str, scope: Scope) -> Result<Vec<RowRule>> {
        Ok(self
            .snapshot_for_table(user, table)?
            .row_rules(table, scope, None))
    }

    /// [`get_row_permissions`](Self::get_row_permissions) restricted to `action`.
    pub fn get_row_permissions_for(
        &self,
        user: &str,
        table: &str,
        scope: Scope,
        action: Action,
    ) -> Result<Vec<RowRule>> {
        Ok(self
            .snapshot_for_table(user, table)?
            .row_rules(table, scope, Some(action)))
    }

    /// Row-level decision for `table` and `action`.
    pub fn row_access(&self, user: &str, table: &str, action: Action) -> Result<RowAccess> {
        Ok(self
            .snapshot_for_table(user, table)?
            .row_access(table, Some(action)))
    }

    /// Table grant present and, if row records exist, the newest one grants.
    pub fn check_query_permissions(&self, user: &str, table: &str) -> Result<bool> {
        let allowed = self.snapshot_for_table(user, table)?.check_query(table, None);
        debug!(user, table, allowed, "query permission check");
        Ok(allowed)
    }

    /// [`check_query_permissions`](Self::check_query_permissions) restricted to `action`.
    pub fn check_query_permissions_for(&self, user: &str, table: &str, action: Action) -> Result<bool> {
        let allowed = self
            .snapshot_for_table(user, table)?
            .check_query(table, Some(action));
        debug!(user, table, %action, allowed, "query permission check");
        Ok(allowed)
    }

    pub(super) fn modify(&self, user: &str, mut edit: impl FnMut(&mut Vec<Permission>)) -> Result<()> {
        require_name("username", user)?;
        self.store.modify_user_permissions(user, &mut edit)?;
        Ok(())
    }

    /// Append a table-scope grant.
    pub fn grant_table_permission(&self, user: &str, table: &str, action: Action) -> Result<()> {
        require_name("table name", table)?;
        self.modify(user, |list| list.push(Permission::table(table, action)))?;
        info!(user, table, %action, "table permission granted");
        Ok(())
    }

    /// Remove every table-scope record for `table` and `action`.
    pub fn revoke_table_permission(&self, user: &str, table: &str, action: Action) -> Result<()> {
        require_name("table name", table)?;
        self.modify(user, |list| {
            list.retain(|p| !(p.scope == Scope::Table && p.action == action && same_table(p, table)))
        })?;
        info!(user, table, %action, "table permission revoked");
        Ok(())
    }

    /// Append a column-scope grant.
    pub fn grant_column_permission(
        &self,
        user: &str,
        table: &str,
        column: &str,
        action: Action,
    ) -> Result<()> {
        require_name("table name", table)?;
        require_name("column name", column)?;
        self.modify(user, |list| list.push(Permission::column(table, column, action)))?;
        info!(user, table, column, %action, "column permission granted");
        Ok(())
    }

    /// Remove every column-scope record for `table.column` and `action`.
    pub fn revoke_column_permission(
        &self,
        user: &str,
        table: &str,
        column: &str,
        action: Action,
    ) -> Result<()> {
        require_name("table name", table)?;
        require_name("column name", column)?;
        self.modify(user, |list| {
            list.retain(|p| {
                !(p.scope == Scope::Column
                    && p.action == action
                    && same_table(p, table)
                    && p.column.trim().eq_ignore_ascii_case(column.trim()))
            })
        })?;
        info!(user, table, column, %action, "column permission revoked");
        Ok(())
    }

    /// Grant a row condition.
    ///
    /// The newest tombstone for the same table and action is re-activated in
    /// place with `condition`; otherwise a record is appended.
    pub fn grant_row_permission(
        &self,
        user: &str,
        table: &str,
        condition: &str,
        action: Action,
    ) -> Result<()> {
        require_name("table name", table)?;
        require_name("row condition", condition)?;
        let condition = condition.trim();
        self.modify(user, |list| {
            let tombstone = list.iter_mut().rev().find(|p| {
                p.scope == Scope::Row && p.action == action && same_table(p, table) && p.is_revoked()
            });
            match tombstone {
                Some(record) => record.condition = condition.to_string(),
                None => list.push(Permission::row(table, condition, action)),
            }
        })?;
        info!(user, table, condition, %action, "row permission granted");
        Ok(())
    }

    /// Tombstone live row records for `table` and `action`.
    ///
    /// With `condition`, only records carrying exactly that condition are
    /// revoked; without, all of them.
    pub fn revoke_row_permission(
        &self,
        user: &str,
        table: &str,
        condition: Option<&str>,
        action: Action,
    ) -> Result<()> {
        require_name("table name", table)?;
        let condition = condition.map(str::trim);
        let mut revoked = 0usize;
        self.modify(user, |list| {
            for record in list.iter_mut().filter(|p| {
                p.scope == Scope::Row
                    && p.action == action
                    && same_table(p, table)
                    && !p.is_revoked()
                    && condition.map_or(true, |c| p.condition.trim() == c)
            }) {
                record.tombstone();
                revoked += 1;
            }
        })?;
        info!(user, table, %action, revoked, "row permission revoked");
        Ok(())
    }
}
