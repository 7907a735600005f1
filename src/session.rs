use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AuthzError, Result, StoreError};
use crate::store::backend::{AuthorizationStore, SessionStore};

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Random 64-character hex identifier.
    pub id: String,
    /// User the session was issued to.
    pub user: String,
    /// Issue time.
    pub created_at: DateTime<Utc>,
    /// The session is invalid from this instant on.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// True once `now` has reached the expiry time.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

fn new_session_id() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Issues, validates and terminates sessions against a store.
pub struct SessionManager<S> {
    store: Arc<S>,
    ttl: TimeDelta,
}

impl<S: AuthorizationStore + SessionStore> SessionManager<S> {
    /// Manager using the configured session lifetime.
    pub fn new(store: Arc<S>, config: &Config) -> Result<Self> {
        let ttl = TimeDelta::try_seconds(config.session_ttl_secs).ok_or_else(|| {
            AuthzError::Config(format!(
                "session_ttl_secs out of range: {}",
                config.session_ttl_secs
            ))
        })?;
        Ok(Self::with_ttl(store, ttl))
    }

    /// Manager with an explicit session lifetime.
    pub fn with_ttl(store: Arc<S>, ttl: TimeDelta) -> Self {
        Self { store, ttl }
    }

    /// Authenticate `user` with `token` and issue a new session.
    pub fn create_session(&self, user: &str, token: &str) -> Result<Session> {
        if user.trim().is_empty() {
            return Err(AuthzError::InvalidInput("username cannot be empty".to_string()));
        }
        if !self.store.authenticate(user, token)? {
            return Err(AuthzError::Authentication(format!(
                "invalid credentials for {user}"
            )));
        }
        let now = Utc::now();
        let session = Session {
            id: new_session_id(),
            user: user.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.store.store_session(&session)?;
        info!(user, expires_at = %session.expires_at, "session created");
        Ok(session)
    }

    /// True when the session exists and has not expired.
    pub fn validate_session(&self, id: &str) -> Result<bool> {
        let now = Utc::now();
        Ok(self
            .store
            .load_session(id)?
            .is_some_and(|session| !session.is_expired_at(now)))
    }

    /// The live session with `id`.
    ///
    /// Missing and expired sessions both fail with [`StoreError::UnknownSession`].
    pub fn get_session(&self, id: &str) -> Result<Session> {
        let now = Utc::now();
        match self.store.load_session(id)? {
            Some(session) if !session.is_expired_at(now) => Ok(session),
            _ => Err(StoreError::UnknownSession(id.to_string()).into()),
        }
    }

    /// End a session. Terminating an unknown id is an error.
    pub fn terminate_session(&self, id: &str) -> Result<()> {
        if !self.store.remove_session(id)? {
            return Err(StoreError::UnknownSession(id.to_string()).into());
        }
        debug!(session = id, "session terminated");
        Ok(())
    }

    /// Drop every expired session, returning how many were removed.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let removed = self.store.remove_expired_sessions(Utc::now())?;
        if removed > 0 {
            debug!(removed, "expired sessions removed");
        }
        Ok(removed)
    }
}
