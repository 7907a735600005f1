/// Permission records, scopes, actions, row rules and the revocation/wildcard markers.
pub mod permission;
/// Role identifiers.
pub mod role;
/// Registered users.
pub mod user;
