use tracing::info;

use super::engine::{require_name, DecisionEngine};
use crate::error::Result;
use crate::model::user::User;
use crate::store::backend::AuthorizationStore;

impl<S: AuthorizationStore> DecisionEngine<S> {
    /// Look up a registered user.
    pub fn get_user(&self, user: &str) -> Result<User> {
        require_name("username", user)?;
        Ok(self.store().get_user(user)?)
    }

    /// Rotate the credential of an existing user.
    pub fn update_user_token(&self, user: &str, token: &str) -> Result<()> {
        require_name("username", user)?;
        require_name("token", token)?;
        self.store().update_user_token(user, token)?;
        info!(user, "user token updated");
        Ok(())
    }

    /// Remove a user with every permission record and session it holds.
    pub fn delete_user(&self, user: &str) -> Result<()> {
        require_name("username", user)?;
        self.store().delete_user(user)?;
        info!(user, "user deleted");
        Ok(())
    }
}
