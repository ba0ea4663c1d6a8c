//! Shared error type for configuration loading

use thiserror::Error;

/// Errors surfaced while loading and validating client configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using the shared Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_includes_context() {
        let err = Error::Config("auth mode requires at least one token".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: auth mode requires at least one token"
        );
    }

    #[test]
    fn io_error_converts() {
        let err: Error =
            std::io::Error::new(std::io::ErrorKind::NotFound, "key file missing").into();
        assert!(err.to_string().starts_with("I/O error:"), "got: {err}");
    }
}
