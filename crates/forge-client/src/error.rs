//! Typed failure taxonomy
//!
//! Every failure that leaves the executor is an `ApiError`: a category the
//! caller can match on, a human-readable message, the HTTP status when one
//! was received, whether the failure was considered retryable, and the
//! request context for diagnosis. Raw transport errors never cross the
//! crate boundary.
//!
//! `ApiError` and `RequestContext` are plain data with no reference back to
//! the client, so they can be stored, logged, and sent across tasks freely.

use std::fmt;
use std::time::{Duration, Instant};

/// Machine-checkable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential rejected, pool exhausted, or token minting failed.
    Auth,
    /// Primary or secondary rate limit.
    RateLimit,
    /// Resource does not exist (or is hidden from this credential).
    NotFound,
    /// The vendor answered, but not with the expected contract.
    Validation,
    /// Transport-level failure: timeout, connect, broken stream.
    Network,
    /// Vendor-side 5xx.
    Server,
    /// Anything that fits nowhere else.
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "auth",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Network => "network",
            ErrorCategory::Server => "server",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral per-call record, attached to errors for diagnosis.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Operation name, e.g. `repository.get`.
    pub operation: String,
    /// `req_`-prefixed id unique to this call.
    pub request_id: String,
    /// Retries performed so far (0 on the first attempt).
    pub retry_attempt: u32,
    /// Configured retry ceiling for this call.
    pub max_retries: u32,
    pub started_at: Instant,
}

impl RequestContext {
    pub fn new(operation: impl Into<String>, max_retries: u32) -> Self {
        Self {
            operation: operation.into(),
            request_id: format!("req_{}", uuid::Uuid::new_v4().as_simple()),
            retry_attempt: 0,
            max_retries,
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Typed failure crossing the client boundary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{category} error in {operation}: {message}", operation = .context.operation)]
pub struct ApiError {
    pub category: ErrorCategory,
    pub message: String,
    pub http_status: Option<u16>,
    pub retryable: bool,
    pub context: RequestContext,
}

impl ApiError {
    pub fn new(
        category: ErrorCategory,
        message: impl Into<String>,
        context: RequestContext,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            http_status: None,
            retryable: false,
            context,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn is_auth(&self) -> bool {
        self.category == ErrorCategory::Auth
    }

    pub fn is_rate_limit(&self) -> bool {
        self.category == ErrorCategory::RateLimit
    }

    pub fn is_not_found(&self) -> bool {
        self.category == ErrorCategory::NotFound
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;
