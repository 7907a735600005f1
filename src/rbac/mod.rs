/// Store-backed checks and grant/revoke semantics.
pub mod engine;
/// Role registry, membership and role-wide grants.
pub mod roles;
/// Pure evaluation of one user's permission list.
pub mod snapshot;
/// User lookup, credential rotation and removal.
pub mod users;
