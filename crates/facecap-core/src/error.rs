use thiserror::Error;

/// Errors surfaced by recorder, player and store operations.
///
/// None of these are fatal: each leaves state untouched and the user
/// action can be retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Required configuration is absent (e.g. no head bone assigned).
    #[error("precondition failed: {0}")]
    Precondition(String),
    /// The data handed to an operation is structurally unusable.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A referenced take does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The operation is forbidden in the current state.
    #[error("conflict: {0}")]
    Conflict(String),
}
