use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::backend::{AuthorizationStore, SessionStore, StoreResult};
use crate::error::StoreError;
use crate::model::permission::Permission;
use crate::model::role::{Role, RoleId};
use crate::model::user::User;
use crate::session::Session;

#[derive(Debug)]
struct UserRecord {
    token: String,
    created_at: DateTime<Utc>,
}

impl UserRecord {
    fn new(token: String) -> Self {
        Self {
            token,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
struct MemoryState {
    users: HashMap<String, UserRecord>,
    permissions: HashMap<String, Vec<Permission>>,
    roles: BTreeMap<RoleId, String>,
    next_role_id: RoleId,
    sessions: HashMap<String, Session>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            permissions: HashMap::new(),
            roles: BTreeMap::new(),
            next_role_id: 1,
            sessions: HashMap::new(),
        }
    }
}

impl MemoryState {
    fn require_user(&self, user: &str) -> StoreResult<()> {
        if self.users.contains_key(user) {
            Ok(())
        } else {
            Err(StoreError::UnknownUser(user.to_string()))
        }
    }

    fn role_id(&self, name: &str) -> Option<RoleId> {
        self.roles
            .iter()
            .find_map(|(id, role)| (role == name).then_some(*id))
    }
}

/// Policy seed document accepted by [`MemoryStore::load_from_json`].
///
/// ```json
/// {
///   "roles": ["analyst"],
///   "users": [
///     {
///       "name": "alice",
///       "token": "secret",
///       "roles": ["analyst"],
///       "permissions": [
///         {"scope": "table", "table": "orders", "action": "select"},
///         {"scope": "row", "table": "orders", "action": "select", "condition": "user_id = 42"}
///       ]
///     }
///   ]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PolicySeed {
    roles: Vec<String>,
    users: Vec<UserSeed>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserSeed {
    name: String,
    token: String,
    roles: Vec<String>,
    permissions: Vec<Permission>,
}

/// Thread-safe in-memory [`AuthorizationStore`] and [`SessionStore`].
///
/// Every read-modify-write runs under the write lock, so concurrent grants to
/// the same user never lose updates.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }

    /// Register a user, or replace the token of an existing one.
    pub fn add_user(&self, user: &str, token: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        state
            .users
            .entry(user.to_string())
            .and_modify(|record| record.token = token.to_string())
            .or_insert_with(|| UserRecord::new(token.to_string()));
        state.permissions.entry(user.to_string()).or_default();
        Ok(())
    }

    /// Append a permission record to a registered user.
    pub fn add_permission(&self, user: &str, permission: Permission) -> StoreResult<()> {
        let mut state = self.write()?;
        state.require_user(user)?;
        state
            .permissions
            .entry(user.to_string())
            .or_default()
            .push(permission);
        Ok(())
    }

    /// Every registered role, ordered by id.
    pub fn roles(&self) -> StoreResult<Vec<Role>> {
        Ok(self
            .read()?
            .roles
            .iter()
            .map(|(id, name)| Role {
                id: *id,
                name: name.clone(),
            })
            .collect())
    }

    /// Build a store from a JSON policy seed.
    ///
    /// Roles listed on a user are created on demand and recorded as
    /// membership records ahead of the user's explicit permissions.
    pub fn load_from_json(json: &str) -> StoreResult<Self> {
        let seed: PolicySeed = serde_json::from_str(json)?;
        let store = Self::new();
        {
            let mut state = store.write()?;
            for role in &seed.roles {
                if state.role_id(role).is_some() {
                    return Err(StoreError::DuplicateRole(role.clone()));
                }
                insert_role(&mut state, role);
            }
            for user in seed.users {
                let mut permissions = Vec::with_capacity(user.roles.len() + user.permissions.len());
                for role in &user.roles {
                    if state.role_id(role).is_none() {
                        insert_role(&mut state, role);
                    }
                    permissions.push(Permission::role_membership(role.as_str()));
                }
                permissions.extend(user.permissions);
                state
                    .users
                    .insert(user.name.clone(), UserRecord::new(user.token));
                state.permissions.insert(user.name, permissions);
            }
            debug!(
                users = state.users.len(),
                roles = state.roles.len(),
                "policy seed loaded"
            );
        }
        Ok(store)
    }

    /// Build a store from a JSON policy seed file.
    pub fn from_path(path: &Path) -> StoreResult<Self> {
        Self::load_from_json(&std::fs::read_to_string(path)?)
    }
}

fn insert_role(state: &mut MemoryState, name: &str) -> RoleId {
    let id = state.next_role_id;
    state.next_role_id += 1;
    state.roles.insert(id, name.to_string());
    id
}

impl AuthorizationStore for MemoryStore {
    fn authenticate(&self, user: &str, token: &str) -> StoreResult<bool> {
        Ok(self
            .read()?
            .users
            .get(user)
            .is_some_and(|record| record.token == token))
    }

    fn user_exists(&self, user: &str) -> StoreResult<bool> {
        Ok(self.read()?.users.contains_key(user))
    }

    fn get_user(&self, user: &str) -> StoreResult<User> {
        self.read()?
            .users
            .get(user)
            .map(|record| User {
                name: user.to_string(),
                created_at: record.created_at,
            })
            .ok_or_else(|| StoreError::UnknownUser(user.to_string()))
    }

    fn update_user_token(&self, user: &str, token: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        let record = state
            .users
            .get_mut(user)
            .ok_or_else(|| StoreError::UnknownUser(user.to_string()))?;
        record.token = token.to_string();
        Ok(())
    }

    fn delete_user(&self, user: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.users.remove(user).is_none() {
            return Err(StoreError::UnknownUser(user.to_string()));
        }
        state.permissions.remove(user);
        state.sessions.retain(|_, session| session.user != user);
        Ok(())
    }

    fn get_user_permissions(&self, user: &str) -> StoreResult<Vec<Permission>> {
        let state = self.read()?;
        state.require_user(user)?;
        Ok(state.permissions.get(user).cloned().unwrap_or_default())
    }

    fn update_user_permissions(&self, user: &str, permissions: Vec<Permission>) -> StoreResult<()> {
        let mut state = self.write()?;
        state.require_user(user)?;
        state.permissions.insert(user.to_string(), permissions);
        Ok(())
    }

    fn modify_user_permissions(
        &self,
        user: &str,
        edit: &mut dyn FnMut(&mut Vec<Permission>),
    ) -> StoreResult<()> {
        let mut state = self.write()?;
        state.require_user(user)?;
        edit(state.permissions.entry(user.to_string()).or_default());
        Ok(())
    }

    fn get_users_with_role(&self, role: &str) -> StoreResult<Vec<String>> {
        let state = self.read()?;
        let mut users: Vec<String> = state
            .permissions
            .iter()
            .filter(|(_, permissions)| permissions.iter().any(|p| p.is_membership_of(role)))
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        Ok(users)
    }

    fn add_role(&self, name: &str) -> StoreResult<RoleId> {
        let mut state = self.write()?;
        if state.role_id(name).is_some() {
            return Err(StoreError::DuplicateRole(name.to_string()));
        }
        Ok(insert_role(&mut state, name))
    }

    fn role_id(&self, name: &str) -> StoreResult<RoleId> {
        self.read()?
            .role_id(name)
            .ok_or_else(|| StoreError::UnknownRole(name.to_string()))
    }

    fn role_name(&self, id: RoleId) -> StoreResult<String> {
        self.read()?
            .roles
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownRole(id.to_string()))
    }

    fn delete_role(&self, id: RoleId) -> StoreResult<()> {
        self.write()?
            .roles
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::UnknownRole(id.to_string()))
    }
}

impl SessionStore for MemoryStore {
    fn store_session(&self, session: &Session) -> StoreResult<()> {
        self.write()?
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn load_session(&self, id: &str) -> StoreResult<Option<Session>> {
        Ok(self.read()?.sessions.get(id).cloned())
    }

    fn remove_session(&self, id: &str) -> StoreResult<bool> {
        Ok(self.write()?.sessions.remove(id).is_some())
    }

    fn remove_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut state = self.write()?;
        let before = state.sessions.len();
        state.sessions.retain(|_, session| !session.is_expired_at(now));
        Ok(before - state.sessions.len())
    }
}
