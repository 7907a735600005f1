use serde::{Deserialize, Serialize};

/// Integer identifier assigned to a role by the authorization store.
pub type RoleId = i64;

/// A named role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Store-assigned identifier.
    pub id: RoleId,
    /// Unique role name.
    pub name: String,
}
