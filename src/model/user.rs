use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user. The credential is never exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user name.
    pub name: String,
    /// When the user was first registered.
    pub created_at: DateTime<Utc>,
}
