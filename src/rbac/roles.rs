use tracing::info;

use super::engine::{require_name, DecisionEngine};
use crate::error::{Result, StoreError};
use crate::model::permission::{Action, Permission};
use crate::model::role::RoleId;
use crate::store::backend::AuthorizationStore;

/// Role registry, membership and materialized role grants.
///
/// Membership is the table-scope record produced by
/// [`Permission::role_membership`]. Granting to a role copies the grant onto
/// every current holder; later membership changes do not retract it.
impl<S: AuthorizationStore> DecisionEngine<S> {
    /// Register a role.
    pub fn create_role(&self, name: &str) -> Result<RoleId> {
        require_name("role name", name)?;
        let id = self.store().add_role(name)?;
        info!(role = name, id, "role created");
        Ok(id)
    }

    /// True when a role called `name` is registered.
    pub fn role_exists(&self, name: &str) -> Result<bool> {
        match self.store().role_id(name) {
            Ok(_) => Ok(true),
            Err(StoreError::UnknownRole(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Strip the role from every holder, then unregister it.
    pub fn delete_role(&self, name: &str) -> Result<()> {
        require_name("role name", name)?;
        let id = self.store().role_id(name)?;
        for user in self.store().get_users_with_role(name)? {
            self.remove_role_from_user(&user, name)?;
        }
        self.store().delete_role(id)?;
        info!(role = name, id, "role deleted");
        Ok(())
    }

    /// Give `user` the registered role `role`. Assigning twice is a no-op.
    pub fn assign_role_to_user(&self, user: &str, role: &str) -> Result<()> {
        require_name("username", user)?;
        require_name("role name", role)?;
        if !self.store().user_exists(user)? {
            return Err(StoreError::UnknownUser(user.to_string()).into());
        }
        self.store().role_id(role)?;
        self.modify(user, |list| {
            if !list.iter().any(|p| p.is_membership_of(role)) {
                list.push(Permission::role_membership(role));
            }
        })?;
        info!(user, role, "role assigned");
        Ok(())
    }

    /// Remove the membership record of `role` from `user`.
    pub fn remove_role_from_user(&self, user: &str, role: &str) -> Result<()> {
        require_name("role name", role)?;
        self.modify(user, |list| list.retain(|p| !p.is_membership_of(role)))?;
        info!(user, role, "role removed");
        Ok(())
    }

    /// True when `user` holds `role`.
    pub fn user_has_role(&self, user: &str, role: &str) -> Result<bool> {
        require_name("role name", role)?;
        Ok(self.snapshot(user)?.has_role(role))
    }

    fn role_holders(&self, role_id: RoleId) -> Result<Vec<String>> {
        let role = self.store().role_name(role_id)?;
        Ok(self.store().get_users_with_role(&role)?)
    }

    /// Grant a table permission to every current holder of `role_id`.
    /// Returns the number of users granted.
    pub fn grant_table_permission_to_role(
        &self,
        role_id: RoleId,
        table: &str,
        action: Action,
    ) -> Result<usize> {
        let users = self.role_holders(role_id)?;
        for user in &users {
            self.grant_table_permission(user, table, action)?;
        }
        Ok(users.len())
    }

    /// Grant a column permission to every current holder of `role_id`.
    pub fn grant_column_permission_to_role(
        &self,
        role_id: RoleId,
        table: &str,
        column: &str,
        action: Action,
    ) -> Result<usize> {
        let users = self.role_holders(role_id)?;
        for user in &users {
            self.grant_column_permission(user, table, column, action)?;
        }
        Ok(users.len())
    }

    /// Grant a row condition to every current holder of `role_id`.
    pub fn grant_row_permission_to_role(
        &self,
        role_id: RoleId,
        table: &str,
        condition: &str,
        action: Action,
    ) -> Result<usize> {
        let users = self.role_holders(role_id)?;
        for user in &users {
            self.grant_row_permission(user, table, condition, action)?;
        }
        Ok(users.len())
    }
}
