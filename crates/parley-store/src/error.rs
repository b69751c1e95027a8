use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An operation requiring a signed-in user ran without one.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The caller handed over something unusable (empty send, bad pair).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A lookup expected exactly one record but found none.
    #[error("Record not found")]
    NotFound,

    /// A create raced another client into a unique-constraint violation.
    /// Resolved internally by re-querying, never surfaced to the user.
    #[error("Duplicate record")]
    Conflict,

    /// The persistence collaborator failed a request.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
