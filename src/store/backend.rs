use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::permission::Permission;
use crate::model::role::RoleId;
use crate::model::user::User;
use crate::session::Session;

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Users, their ordered permission lists and the role registry.
pub trait AuthorizationStore: Send + Sync {
    /// True when `user` exists and `token` is its credential.
    fn authenticate(&self, user: &str, token: &str) -> StoreResult<bool>;

    /// True when `user` is registered.
    fn user_exists(&self, user: &str) -> StoreResult<bool>;

    /// The registered user called `user`.
    ///
    /// Fails with [`StoreError::UnknownUser`] for unregistered users, as do
    /// [`update_user_token`](Self::update_user_token) and
    /// [`delete_user`](Self::delete_user).
    fn get_user(&self, user: &str) -> StoreResult<User>;

    /// Replace the credential of an existing user.
    fn update_user_token(&self, user: &str, token: &str) -> StoreResult<()>;

    /// Remove `user` together with its permission records and sessions.
    fn delete_user(&self, user: &str) -> StoreResult<()>;

    /// The user's permission records in insertion order.
    ///
    /// Fails with [`StoreError::UnknownUser`] for unregistered users.
    fn get_user_permissions(&self, user: &str) -> StoreResult<Vec<Permission>>;

    /// Replace the user's whole permission list.
    fn update_user_permissions(&self, user: &str, permissions: Vec<Permission>) -> StoreResult<()>;

    /// Read-modify-write of one user's permission list.
    ///
    /// The default composes [`get_user_permissions`](Self::get_user_permissions)
    /// and [`update_user_permissions`](Self::update_user_permissions), so two
    /// concurrent calls may race; backends that can hold a lock across both
    /// steps override it.
    fn modify_user_permissions(
        &self,
        user: &str,
        edit: &mut dyn FnMut(&mut Vec<Permission>),
    ) -> StoreResult<()> {
        let mut permissions = self.get_user_permissions(user)?;
        edit(&mut permissions);
        self.update_user_permissions(user, permissions)
    }

    /// Users holding a membership record for `role`, sorted by name.
    fn get_users_with_role(&self, role: &str) -> StoreResult<Vec<String>>;

    /// Register a role and return its id.
    fn add_role(&self, name: &str) -> StoreResult<RoleId>;

    /// Id of the role called `name`.
    fn role_id(&self, name: &str) -> StoreResult<RoleId>;

    /// Name of the role with `id`.
    fn role_name(&self, id: RoleId) -> StoreResult<String>;

    /// Remove a role from the registry. Membership records are not touched.
    fn delete_role(&self, id: RoleId) -> StoreResult<()>;
}

/// Persistence for issued sessions.
pub trait SessionStore: Send + Sync {
    /// Persist a new session.
    fn store_session(&self, session: &Session) -> StoreResult<()>;

    /// The session with `id`, expired or not.
    fn load_session(&self, id: &str) -> StoreResult<Option<Session>>;

    /// Delete a session, returning whether it existed.
    fn remove_session(&self, id: &str) -> StoreResult<bool>;

    /// Delete every session expiring at or before `now`, returning how many.
    fn remove_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<usize>;
}
