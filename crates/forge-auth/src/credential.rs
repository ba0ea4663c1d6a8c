//! Immutable credential units
//!
//! A `Credential` is one usable authentication unit as the pool sees it:
//! identity, kind, secret material, scopes, and an optional expiry. For
//! static and OAuth credentials the secret is the bearer token itself. For
//! installation credentials the secret holds the installation id; the actual
//! short-lived token is minted on demand by `AppAuthenticator` and never
//! stored on the credential.
//!
//! Expiry timestamps are unix milliseconds (absolute, not deltas), computed
//! at issue time from the vendor's seconds delta.

use forge_common::Secret;
use std::time::Duration;

/// Current time as a unix timestamp in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// How a credential authenticates against the vendor API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// Long-lived token configured directly; used as-is.
    Static,
    /// App installation; short-lived tokens minted via signed assertion.
    Installation,
    /// Access token obtained through an OAuth flow elsewhere.
    OAuth,
}

impl CredentialKind {
    /// Kind label for health reporting and logging.
    pub fn label(&self) -> &'static str {
        match self {
            CredentialKind::Static => "static",
            CredentialKind::Installation => "installation",
            CredentialKind::OAuth => "oauth",
        }
    }
}

/// One usable authentication unit. Immutable once issued; a refresh replaces
/// the whole value.
#[derive(Debug, Clone)]
pub struct Credential {
    id: String,
    kind: CredentialKind,
    secret: Secret<String>,
    scopes: Vec<String>,
    expires_at: Option<u64>,
}

impl Credential {
    /// A static token credential. Never expires, never refreshed.
    pub fn static_token(id: impl Into<String>, token: impl Into<Secret<String>>) -> Self {
        Self {
            id: id.into(),
            kind: CredentialKind::Static,
            secret: token.into(),
            scopes: Vec::new(),
            expires_at: None,
        }
    }

    /// An OAuth access token credential with an optional absolute expiry.
    pub fn oauth(
        id: impl Into<String>,
        access_token: impl Into<Secret<String>>,
        expires_at: Option<u64>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: CredentialKind::OAuth,
            secret: access_token.into(),
            scopes: Vec::new(),
            expires_at,
        }
    }

    /// An app-installation credential identified by its installation id.
    /// The bearer token is minted per call by `AppAuthenticator`.
    pub fn installation(installation_id: u64) -> Self {
        Self {
            id: format!("installation-{installation_id}"),
            kind: CredentialKind::Installation,
            secret: Secret::new(installation_id.to_string()),
            scopes: Vec::new(),
            expires_at: None,
        }
    }

    /// Attach granted scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn secret(&self) -> &Secret<String> {
        &self.secret
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    /// Whether the credential is already past its expiry at `now` (millis).
    pub fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expires) if expires <= now)
    }

    /// Whether the credential expires within `margin` of `now` (millis).
    /// Credentials without an expiry never report true.
    pub fn expires_within(&self, now: u64, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires) => expires <= now + margin.as_millis() as u64,
            None => false,
        }
    }

    /// Installation id for installation credentials, `None` otherwise.
    pub fn installation_id(&self) -> Option<u64> {
        match self.kind {
            CredentialKind::Installation => self.secret.expose().parse().ok(),
            _ => None,
        }
    }

    /// `authorization` header value for credentials whose secret is a bearer
    /// token. Installation credentials return `None` — their token is minted
    /// by the authenticator.
    pub fn authorization_value(&self) -> Option<String> {
        match self.kind {
            CredentialKind::Static | CredentialKind::OAuth => {
                Some(format!("Bearer {}", self.secret.expose()))
            }
            CredentialKind::Installation => None,
        }
    }
}
