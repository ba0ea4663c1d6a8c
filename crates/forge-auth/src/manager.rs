//! Credential resolution into request headers
//!
//! The manager is the seam between pool-selected credentials and the wire:
//! given a credential, produce the `authorization` header value. Static and
//! OAuth secrets pass through as bearer tokens; installation credentials go
//! through the app authenticator's mint cache.

use std::sync::Arc;

use tracing::debug;

use crate::app::AppAuthenticator;
use crate::credential::{Credential, CredentialKind};
use crate::error::{Error, Result};

/// Resolves credentials into `authorization` header values.
pub struct AuthManager {
    app: Option<Arc<AppAuthenticator>>,
}

impl AuthManager {
    /// Manager for static/OAuth credentials only.
    pub fn new() -> Self {
        Self { app: None }
    }

    /// Manager that can also materialize installation credentials.
    pub fn with_app(app: Arc<AppAuthenticator>) -> Self {
        Self { app: Some(app) }
    }

    /// `authorization` header value for the given credential.
    ///
    /// Installation credentials require an app authenticator; without one the
    /// pool was configured inconsistently and this fails with
    /// `MissingConfig`.
    pub async fn authorization_for(&self, credential: &Credential) -> Result<String> {
        match credential.kind() {
            CredentialKind::Static | CredentialKind::OAuth => credential
                .authorization_value()
                .ok_or_else(|| Error::InvalidCredentials(format!("{} has no token", credential.id()))),
            CredentialKind::Installation => {
                let app = self.app.as_ref().ok_or_else(|| {
                    Error::MissingConfig(format!(
                        "{} requires an app identity but none is configured",
                        credential.id()
                    ))
                })?;
                let installation_id = credential.installation_id().ok_or_else(|| {
                    Error::InvalidCredentials(format!(
                        "{} carries no installation id",
                        credential.id()
                    ))
                })?;
                debug!(credential_id = credential.id(), "resolving installation token");
                let token = app.installation_token(installation_id).await?;
                Ok(format!("Bearer {}", token.expose()))
            }
        }
    }
}

impl Default for AuthManager {
    fn default() -> Self {
        Self::new()
    }
}
