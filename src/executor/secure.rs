use std::sync::Arc;

use tracing::{debug, info};

use super::engine::{ExecResult, ExecutionEngine, QueryResult, SqlValue};
use crate::config::Config;
use crate::error::{AuthzError, Result};
use crate::pipeline::authorize::{AuthorizationPipeline, Authorized};
use crate::rbac::engine::require_name;
use crate::session::SessionManager;
use crate::store::backend::{AuthorizationStore, SessionStore};

/// A user-bound handle that authorizes every statement before the engine
/// sees it.
///
/// Credentials are checked once, at open time. Permissions are not: each
/// statement reads the user's current list, so a revoke takes effect on the
/// next call.
pub struct SecureConnection<S, E> {
    pipeline: AuthorizationPipeline<S>,
    engine: Arc<E>,
    user: String,
}

impl<S: AuthorizationStore, E: ExecutionEngine> SecureConnection<S, E> {
    /// Authenticate `user` with `token` and bind a connection to them.
    pub fn open(
        store: Arc<S>,
        engine: Arc<E>,
        user: &str,
        token: &str,
        config: &Config,
    ) -> Result<Self> {
        require_name("username", user)?;
        if !store.authenticate(user, token)? {
            return Err(AuthzError::Authentication(format!(
                "invalid credentials for {user}"
            )));
        }
        info!(user, "secure connection opened");
        Ok(Self {
            pipeline: AuthorizationPipeline::from_config(store, config)?,
            engine,
            user: user.to_string(),
        })
    }

    /// Bind a connection to the owner of a live session.
    pub fn from_session(
        store: Arc<S>,
        engine: Arc<E>,
        sessions: &SessionManager<S>,
        session_id: &str,
        config: &Config,
    ) -> Result<Self>
    where
        S: SessionStore,
    {
        let session = sessions.get_session(session_id)?;
        info!(user = %session.user, "secure connection opened from session");
        Ok(Self {
            pipeline: AuthorizationPipeline::from_config(store, config)?,
            engine,
            user: session.user,
        })
    }

    /// The bound user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Decide on `sql` without running it.
    pub fn authorize(&self, sql: &str) -> Result<Authorized> {
        self.pipeline.authorize(&self.user, sql)
    }

    /// Authorize `sql`, then run it as a row-returning query.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
        let authorized = self.authorize(sql)?;
        debug!(user = %self.user, sql = %authorized.sql, "running authorized query");
        self.engine.query(&authorized.sql, params)
    }

    /// Authorize `sql`, then run it as a statement.
    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecResult> {
        let authorized = self.authorize(sql)?;
        debug!(user = %self.user, sql = %authorized.sql, "running authorized statement");
        self.engine.execute(&authorized.sql, params)
    }
}
