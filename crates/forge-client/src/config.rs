//! Configuration loading and validation
//!
//! Config precedence: CLI arg > `FORGE_CONFIG` env var > default filename
//! for the file path, and `FORGE_TOKEN` over file-configured tokens for
//! secret material. Validation happens entirely at load time: a bad URL
//! scheme, an empty token set, or an unreadable key file fails here, never
//! at first request.
//!
//! The installation key lives in a file referenced by the config, not in
//! the TOML itself, so config files stay safe to commit and ship.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use forge_auth::{AppAuthenticator, Credential};
use forge_common::{Error, Result};

use crate::executor::ExecutorOptions;
use crate::retry::{Backoff, RetryConfig};

/// Root configuration for the client.
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    pub api: ApiSection,
    pub auth: AuthSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub retry: RetrySection,
}

/// Vendor endpoint settings.
#[derive(Debug, Deserialize)]
pub struct ApiSection {
    pub base_url: String,
    /// Full GraphQL URL; defaults to `{base_url}/graphql`.
    #[serde(default)]
    pub graphql_url: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Authentication mode and material.
#[derive(Deserialize)]
pub struct AuthSection {
    pub mode: AuthMode,
    /// Static or OAuth tokens; overridden entirely by `FORGE_TOKEN`.
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub app_id: Option<u64>,
    /// Path to the app's PEM-encoded RSA key.
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
    #[serde(default)]
    pub installation_ids: Vec<u64>,
}

// Tokens are secret material; Debug shows only how many are configured.
impl std::fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSection")
            .field("mode", &self.mode)
            .field("tokens", &format!("[{} redacted]", self.tokens.len()))
            .field("app_id", &self.app_id)
            .field("private_key_file", &self.private_key_file)
            .field("installation_ids", &self.installation_ids)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Static,
    Installation,
    Oauth,
}

/// Cache bounds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub max_size: usize,
    pub max_age_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_size: 256,
            max_age_secs: 300,
        }
    }
}

/// Retry knobs; defaults mirror `RetryConfig::default`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub retries: u32,
    pub do_not_retry: Vec<u16>,
    pub primary_limit_retries: u32,
    pub secondary_limit_retries: u32,
    pub max_throttle_wait_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            retries: defaults.retries,
            do_not_retry: defaults.do_not_retry,
            primary_limit_retries: defaults.primary_limit_retries,
            secondary_limit_retries: defaults.secondary_limit_retries,
            max_throttle_wait_secs: defaults.max_throttle_wait.as_secs(),
        }
    }
}

fn default_user_agent() -> String {
    String::from("forge-client/0.1.0")
}

fn default_timeout_secs() -> u64 {
    30
}

impl ClientConfig {
    /// Load configuration from a TOML file, overlay `FORGE_TOKEN`, and
    /// validate. Any problem fails here with a `Config` error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: ClientConfig = toml::from_str(&contents)?;

        // Env token replaces any file-configured tokens for token modes.
        if let Ok(token) = std::env::var("FORGE_TOKEN")
            && !token.trim().is_empty()
            && config.auth.mode != AuthMode::Installation
        {
            config.auth.tokens = vec![token.trim().to_owned()];
        }

        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file path from CLI arg or `FORGE_CONFIG` env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(path) = cli_path {
            return PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("FORGE_CONFIG") {
            return PathBuf::from(path);
        }
        PathBuf::from("forge-client.toml")
    }

    fn validate(&self) -> Result<()> {
        check_url("base_url", &self.api.base_url)?;
        if let Some(graphql_url) = &self.api.graphql_url {
            check_url("graphql_url", graphql_url)?;
        }
        if self.api.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }

        match self.auth.mode {
            AuthMode::Static | AuthMode::Oauth => {
                if self.auth.tokens.is_empty() {
                    return Err(Error::Config(format!(
                        "auth mode {:?} requires at least one token (file or FORGE_TOKEN)",
                        self.auth.mode
                    )));
                }
                if self.auth.tokens.iter().any(|t| t.trim().is_empty()) {
                    return Err(Error::Config("configured tokens must not be empty".into()));
                }
            }
            AuthMode::Installation => {
                if self.auth.app_id.is_none() {
                    return Err(Error::Config(
                        "installation mode requires auth.app_id".into(),
                    ));
                }
                if self.auth.private_key_file.is_none() {
                    return Err(Error::Config(
                        "installation mode requires auth.private_key_file".into(),
                    ));
                }
                if self.auth.installation_ids.is_empty() {
                    return Err(Error::Config(
                        "installation mode requires at least one installation id".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Full GraphQL endpoint URL.
    pub fn graphql_url(&self) -> String {
        match &self.api.graphql_url {
            Some(url) => url.clone(),
            None => format!("{}/graphql", self.api.base_url.trim_end_matches('/')),
        }
    }

    /// Default per-entry cache TTL.
    pub fn default_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.max_age_secs)
    }

    /// Executor knobs derived from this config.
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            base_url: self.api.base_url.clone(),
            request_timeout: Duration::from_secs(self.api.timeout_secs),
            cache_max_size: self.cache.max_size,
            default_cache_ttl: self.default_cache_ttl(),
            retry: self.retry_config(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            retries: self.retry.retries,
            do_not_retry: self.retry.do_not_retry.clone(),
            primary_limit_retries: self.retry.primary_limit_retries,
            secondary_limit_retries: self.retry.secondary_limit_retries,
            max_throttle_wait: Duration::from_secs(self.retry.max_throttle_wait_secs),
            backoff: Backoff::default(),
        }
    }

    /// Build the credential set for the pool.
    pub fn credentials(&self) -> Result<Vec<Credential>> {
        let credentials = match self.auth.mode {
            AuthMode::Static => self
                .auth
                .tokens
                .iter()
                .enumerate()
                .map(|(i, token)| Credential::static_token(format!("static-{i}"), token.as_str()))
                .collect(),
            AuthMode::Oauth => self
                .auth
                .tokens
                .iter()
                .enumerate()
                .map(|(i, token)| Credential::oauth(format!("oauth-{i}"), token.as_str(), None))
                .collect(),
            AuthMode::Installation => self
                .auth
                .installation_ids
                .iter()
                .map(|id| Credential::installation(*id))
                .collect(),
        };
        Ok(credentials)
    }

    /// Build the app authenticator for installation mode, reading and
    /// validating the key file.
    pub fn app_authenticator(&self) -> Result<AppAuthenticator> {
        let app_id = self
            .auth
            .app_id
            .ok_or_else(|| Error::Config("installation mode requires auth.app_id".into()))?;
        let key_file = self.auth.private_key_file.as_ref().ok_or_else(|| {
            Error::Config("installation mode requires auth.private_key_file".into())
        })?;
        let pem = std::fs::read_to_string(key_file).map_err(|e| {
            Error::Config(format!(
                "failed to read private_key_file {}: {e}",
                key_file.display()
            ))
        })?;
        AppAuthenticator::new(
            app_id,
            &pem,
            self.api.base_url.clone(),
            reqwest::Client::new(),
        )
        .map_err(|e| Error::Config(e.to_string()))
    }
}

fn check_url(field: &str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )))
    }
}
