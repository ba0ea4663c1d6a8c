//! Error types for pool operations

/// Errors from credential pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential pool exhausted: {0}")]
    Exhausted(String),

    #[error("credential not found: {0}")]
    NotFound(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
