//! Resilient client for a rate-limited forge API
//!
//! This crate is the single path through which the rest of the system talks
//! to the vendor: REST reads, search, and GraphQL, under static, app
//! installation, or OAuth credentials, with caching, credential failover,
//! and a structured retry protocol layered on the vendor's rate-limit
//! semantics.
//!
//! Request lifecycle:
//! 1. Caller invokes a typed operation on [`ForgeApi`]
//! 2. [`executor::Executor`] checks the bounded TTL+LRU [`cache`]
//! 3. On a miss, a credential comes from the `forge-pool` rotation and is
//!    materialized into a header by `forge-auth`
//! 4. The call goes out through the [`transport::Transport`] seam; quota
//!    headers refresh [`rate_limit::RateLimitTracker`] on every response
//! 5. Failures are classified into [`error::ErrorCategory`], credential
//!    outcomes are reported to the pool, and [`retry::RetryPolicy`] decides
//!    whether to back off and go again
//!
//! Every call terminates as a cache hit, a fresh success, or a typed
//! [`error::ApiError`] — never a panic or a raw transport error.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod graphql;
pub mod rate_limit;
pub mod retry;
pub mod transport;

pub use api::{Account, ForgeApi, Issue, Repository, SearchResults};
pub use cache::{CacheStats, ResponseCache};
pub use config::{AuthMode, ClientConfig};
pub use error::{ApiError, ErrorCategory, RequestContext, Result};
pub use executor::{Executor, ExecutorOptions, Operation};
pub use graphql::GraphqlAdapter;
pub use rate_limit::{RateLimitBucket, RateLimitSnapshot, RateLimitTracker, ThrottleKind};
pub use retry::{Backoff, RetryConfig, RetryDecider, RetryDecision, RetryPolicy};
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport, TransportError};
