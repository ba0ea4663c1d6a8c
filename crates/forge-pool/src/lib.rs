//! Credential rotation and failover pool
//!
//! Holds the configured credentials together with per-credential health and
//! hands one out per request. Health transitions are driven by outcome
//! reports from the request path:
//!
//! 1. Executor selects a credential (strategy pick among healthy ones)
//! 2. Request fails with an auth error → credential quarantined for the
//!    process lifetime (a rejected token does not heal on its own)
//! 3. Request is rate limited → credential cools down until the vendor's
//!    reported reset time, then automatically re-enters rotation
//! 4. Request succeeds → failure streak cleared
//!
//! Selection and outcome reporting share one lock so no two in-flight calls
//! can observe stale recency data or resurrect a quarantined credential.
//! When nothing is selectable the pool fails with an exhaustion error instead
//! of blocking; callers decide whether to wait and retry.

pub mod error;
pub mod pool;
pub mod strategy;

pub use error::{Error, Result};
pub use pool::{CredentialHealth, CredentialPool, CredentialStatus, Outcome, PoolHealth};
pub use strategy::{Candidate, LeastRecentlyUsed, RoundRobin, SelectionStrategy};
