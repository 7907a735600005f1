/// `AuthorizationStore` and `SessionStore` traits every backend implements.
pub mod backend;
/// In-memory store guarded by a single `RwLock`.
pub mod memory;
/// SQLite-backed store persisting users, permissions, roles and sessions.
pub mod sqlite;
