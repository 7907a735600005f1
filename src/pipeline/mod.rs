/// `AuthorizationPipeline` and its result.
pub mod authorize;
/// Pipeline states.
pub mod stage;
