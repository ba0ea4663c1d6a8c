//! Error types for authentication operations

/// Errors from credential resolution and token minting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("missing auth configuration: {0}")]
    MissingConfig(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
