//! Credential model and authentication for the forge API
//!
//! Three authentication modes are supported:
//! 1. Static token — a long-lived token used as-is, never refreshed
//! 2. Installation app — an app identity (id + RSA key) signs short-lived
//!    assertions and exchanges them for installation tokens, which are cached
//!    and re-minted shortly before they expire
//! 3. OAuth — a previously obtained access token; refreshing it is the job of
//!    an external collaborator, not this crate
//!
//! Credentials are immutable values: a refresh produces a new `Credential`,
//! it never mutates one in place. Misconfiguration (unparseable key, missing
//! app identity) fails at construction time, before any request is issued.

pub mod app;
pub mod credential;
pub mod error;
pub mod manager;

pub use app::{AppAuthenticator, InstallationTokenResponse};
pub use credential::{Credential, CredentialKind, now_millis};
pub use error::{Error, Result};
pub use manager::AuthManager;
