use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::backend::{AuthorizationStore, SessionStore, StoreResult};
use crate::error::StoreError;
use crate::model::permission::{Action, Permission, Scope};
use crate::model::role::RoleId;
use crate::model::user::User;
use crate::session::Session;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sqlwarden_users (
    name TEXT PRIMARY KEY,
    token TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sqlwarden_permissions (
    user_name TEXT NOT NULL REFERENCES sqlwarden_users(name) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    scope TEXT NOT NULL,
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL DEFAULT '',
    action TEXT NOT NULL,
    condition TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (user_name, position)
);
CREATE TABLE IF NOT EXISTS sqlwarden_roles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS sqlwarden_sessions (
    id TEXT PRIMARY KEY,
    user_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
";

/// [`AuthorizationStore`] and [`SessionStore`] persisted in SQLite.
///
/// A user's permission list is stored one row per record with an explicit
/// position, and replaced inside a single transaction. The connection mutex is
/// held across read-modify-write, so updates to one user are serialized.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// A store living only as long as the value.
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Register a user, or replace the token of an existing one.
    pub fn add_user(&self, user: &str, token: &str) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO sqlwarden_users (name, token, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET token = excluded.token",
            params![user, token, timestamp(Utc::now())],
        )?;
        Ok(())
    }
}

fn require_user(conn: &Connection, user: &str) -> StoreResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlwarden_users WHERE name = ?1)",
        [user],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::UnknownUser(user.to_string()))
    }
}

fn parse_column<T: std::str::FromStr<Err = String>>(
    row: &Row<'_>,
    index: usize,
) -> rusqlite::Result<T> {
    let text: String = row.get(index)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, e.into()))
}

fn permission_from_row(row: &Row<'_>) -> rusqlite::Result<Permission> {
    Ok(Permission {
        scope: parse_column::<Scope>(row, 0)?,
        table: row.get(1)?,
        column: row.get(2)?,
        action: parse_column::<Action>(row, 3)?,
        condition: row.get(4)?,
    })
}

fn load_permissions(conn: &Connection, user: &str) -> StoreResult<Vec<Permission>> {
    let mut stmt = conn.prepare(
        "SELECT scope, table_name, column_name, action, condition
         FROM sqlwarden_permissions WHERE user_name = ?1 ORDER BY position",
    )?;
    let permissions = stmt
        .query_map([user], permission_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(permissions)
}

fn replace_permissions(
    conn: &mut Connection,
    user: &str,
    permissions: &[Permission],
) -> StoreResult<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM sqlwarden_permissions WHERE user_name = ?1",
        [user],
    )?;
    {
        let mut insert = tx.prepare(
            "INSERT INTO sqlwarden_permissions
             (user_name, position, scope, table_name, column_name, action, condition)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for (position, permission) in permissions.iter().enumerate() {
            insert.execute(params![
                user,
                position as i64,
                permission.scope.to_string(),
                permission.table,
                permission.column,
                permission.action.to_string(),
                permission.condition,
            ])?;
        }
    }
    tx.commit()?;
    debug!(user, records = permissions.len(), "permissions replaced");
    Ok(())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

impl AuthorizationStore for SqliteStore {
    fn authenticate(&self, user: &str, token: &str) -> StoreResult<bool> {
        let stored: Option<String> = self
            .conn()?
            .query_row(
                "SELECT token FROM sqlwarden_users WHERE name = ?1",
                [user],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.is_some_and(|t| t == token))
    }

    fn user_exists(&self, user: &str) -> StoreResult<bool> {
        match require_user(&*self.conn()?, user) {
            Ok(()) => Ok(true),
            Err(StoreError::UnknownUser(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn get_user(&self, user: &str) -> StoreResult<User> {
        self.conn()?
            .query_row(
                "SELECT name, created_at FROM sqlwarden_users WHERE name = ?1",
                [user],
                |row| {
                    Ok(User {
                        name: row.get(0)?,
                        created_at: parse_timestamp(row, 1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::UnknownUser(user.to_string()))
    }

    fn update_user_token(&self, user: &str, token: &str) -> StoreResult<()> {
        let updated = self.conn()?.execute(
            "UPDATE sqlwarden_users SET token = ?2 WHERE name = ?1",
            params![user, token],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownUser(user.to_string()));
        }
        Ok(())
    }

    fn delete_user(&self, user: &str) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        // Permission rows go with the user through the foreign key cascade.
        let removed = tx.execute("DELETE FROM sqlwarden_users WHERE name = ?1", [user])?;
        if removed == 0 {
            return Err(StoreError::UnknownUser(user.to_string()));
        }
        let sessions = tx.execute(
            "DELETE FROM sqlwarden_sessions WHERE user_name = ?1",
            [user],
        )?;
        tx.commit()?;
        debug!(user, sessions, "user deleted");
        Ok(())
    }

    fn get_user_permissions(&self, user: &str) -> StoreResult<Vec<Permission>> {
        let conn = self.conn()?;
        require_user(&conn, user)?;
        load_permissions(&conn, user)
    }

    fn update_user_permissions(&self, user: &str, permissions: Vec<Permission>) -> StoreResult<()> {
        let mut conn = self.conn()?;
        require_user(&conn, user)?;
        replace_permissions(&mut conn, user, &permissions)
    }

    fn modify_user_permissions(
        &self,
        user: &str,
        edit: &mut dyn FnMut(&mut Vec<Permission>),
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        require_user(&conn, user)?;
        let mut permissions = load_permissions(&conn, user)?;
        edit(&mut permissions);
        replace_permissions(&mut conn, user, &permissions)
    }

    fn get_users_with_role(&self, role: &str) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM sqlwarden_users ORDER BY name")?;
        let users = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut holders = Vec::new();
        for user in users {
            if load_permissions(&conn, &user)?
                .iter()
                .any(|p| p.is_membership_of(role))
            {
                holders.push(user);
            }
        }
        Ok(holders)
    }

    fn add_role(&self, name: &str) -> StoreResult<RoleId> {
        let conn = self.conn()?;
        let existing: Option<RoleId> = conn
            .query_row(
                "SELECT id FROM sqlwarden_roles WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::DuplicateRole(name.to_string()));
        }
        conn.execute("INSERT INTO sqlwarden_roles (name) VALUES (?1)", [name])?;
        Ok(conn.last_insert_rowid())
    }

    fn role_id(&self, name: &str) -> StoreResult<RoleId> {
        self.conn()?
            .query_row(
                "SELECT id FROM sqlwarden_roles WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::UnknownRole(name.to_string()))
    }

    fn role_name(&self, id: RoleId) -> StoreResult<String> {
        self.conn()?
            .query_row(
                "SELECT name FROM sqlwarden_roles WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::UnknownRole(id.to_string()))
    }

    fn delete_role(&self, id: RoleId) -> StoreResult<()> {
        let removed = self
            .conn()?
            .execute("DELETE FROM sqlwarden_roles WHERE id = ?1", [id])?;
        if removed == 0 {
            return Err(StoreError::UnknownRole(id.to_string()));
        }
        Ok(())
    }
}

impl SessionStore for SqliteStore {
    fn store_session(&self, session: &Session) -> StoreResult<()> {
        self.conn()?.execute(
            "INSERT INTO sqlwarden_sessions (id, user_name, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.id,
                session.user,
                timestamp(session.created_at),
                timestamp(session.expires_at),
            ],
        )?;
        Ok(())
    }

    fn load_session(&self, id: &str) -> StoreResult<Option<Session>> {
        let session = self
            .conn()?
            .query_row(
                "SELECT id, user_name, created_at, expires_at
                 FROM sqlwarden_sessions WHERE id = ?1",
                [id],
                |row| {
                    Ok(Session {
                        id: row.get(0)?,
                        user: row.get(1)?,
                        created_at: parse_timestamp(row, 2)?,
                        expires_at: parse_timestamp(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    fn remove_session(&self, id: &str) -> StoreResult<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM sqlwarden_sessions WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    fn remove_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let removed = self.conn()?.execute(
            "DELETE FROM sqlwarden_sessions WHERE expires_at <= ?1",
            [timestamp(now)],
        )?;
        Ok(removed)
    }
}
