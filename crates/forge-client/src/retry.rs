//! Retry policy and backoff
//!
//! The decision ("retry or give up") is a pure function of the failure
//! shape, the attempt counter, and configuration, so it is deterministic and
//! directly testable. Jitter only perturbs the backoff *duration*, never the
//! decision. Three independent ceilings apply:
//! - `retries` for transient network/server failures (exponential backoff)
//! - `primary_limit_retries` for spent quota (wait until the reset time)
//! - `secondary_limit_retries` for abuse throttles (vendor-suggested wait)
//!
//! Statuses on the `do_not_retry` list are caller/data errors and stop
//! immediately, regardless of any ceiling.

use std::time::Duration;

use crate::error::{ErrorCategory, RequestContext};
use crate::rate_limit::ThrottleKind;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Fixed delay between retries.
    Fixed { delay: Duration },
    /// Exponential delay: `base * factor^attempt`, capped at `max`,
    /// optionally jittered by ±50%.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before the retry following failed attempt `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(attempt as i32);
                let seconds = (base.as_secs_f64() * scale).min(max.as_secs_f64());
                let mut delay = Duration::from_secs_f64(seconds);

                if jitter {
                    let half = (delay.as_millis() as f64 * 0.5) as u64;
                    let offset = fastrand::u64(0..=half * 2);
                    let millis = delay.as_millis() as i64 + (offset as i64 - half as i64);
                    delay = Duration::from_millis(millis.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// Retry configuration, normally built from the config surface.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Ceiling for transient failures. Total attempts = `retries + 1`.
    pub retries: u32,
    /// Statuses that never retry: caller/data errors, not transience.
    pub do_not_retry: Vec<u16>,
    /// Ceiling for primary (spent quota) throttles.
    pub primary_limit_retries: u32,
    /// Ceiling for secondary (abuse) throttles.
    pub secondary_limit_retries: u32,
    /// Longest we will sleep on a vendor-advertised reset/wait.
    pub max_throttle_wait: Duration,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            do_not_retry: vec![400, 401, 403, 404, 422],
            primary_limit_retries: 2,
            secondary_limit_retries: 1,
            max_throttle_wait: Duration::from_secs(120),
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Config with a custom transient-retry ceiling, defaults elsewhere.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }
}

/// What the executor observed about one failed attempt.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub category: ErrorCategory,
    pub http_status: Option<u16>,
    pub throttle: Option<ThrottleKind>,
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    Stop,
}

/// Retry decision seam. The executor holds one behind a trait object, so a
/// deployment can override throttle handling wholesale instead of tuning
/// knobs; [`RetryPolicy`] is the default implementation.
pub trait RetryDecider: Send + Sync {
    fn decide(&self, failure: &AttemptFailure, ctx: &RequestContext) -> RetryDecision;

    /// Ceiling recorded on each call's `RequestContext`.
    fn max_retries(&self) -> u32;
}

/// Deterministic retry decisions over a `RetryConfig`.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Decide whether the attempt recorded in `ctx` should be retried.
    ///
    /// Throttles are judged before the `do_not_retry` list: a 403 that is
    /// really a spent quota must follow the throttle path, not the
    /// caller-error path.
    pub fn decide(&self, failure: &AttemptFailure, ctx: &RequestContext) -> RetryDecision {
        match failure.throttle {
            Some(ThrottleKind::Primary { reset_at }) => {
                if ctx.retry_attempt < self.config.primary_limit_retries {
                    RetryDecision::Retry {
                        delay: self.until_reset(reset_at),
                    }
                } else {
                    RetryDecision::Stop
                }
            }
            Some(ThrottleKind::Secondary { retry_after }) => {
                if ctx.retry_attempt < self.config.secondary_limit_retries {
                    RetryDecision::Retry {
                        delay: retry_after.min(self.config.max_throttle_wait),
                    }
                } else {
                    RetryDecision::Stop
                }
            }
            None => {
                if let Some(status) = failure.http_status
                    && self.config.do_not_retry.contains(&status)
                {
                    return RetryDecision::Stop;
                }
                match failure.category {
                    ErrorCategory::Network | ErrorCategory::Server
                        if ctx.retry_attempt < self.config.retries =>
                    {
                        RetryDecision::Retry {
                            delay: self.config.backoff.delay(ctx.retry_attempt),
                        }
                    }
                    _ => RetryDecision::Stop,
                }
            }
        }
    }

    /// Wait from now until the advertised reset time, clamped to the
    /// configured maximum (a reset hours away is not worth sleeping on).
    fn until_reset(&self, reset_at: u64) -> Duration {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let wait = Duration::from_secs(reset_at.saturating_sub(now));
        wait.min(self.config.max_throttle_wait)
    }
}

impl RetryDecider for RetryPolicy {
    fn decide(&self, failure: &AttemptFailure, ctx: &RequestContext) -> RetryDecision {
        RetryPolicy::decide(self, failure, ctx)
    }

    fn max_retries(&self) -> u32 {
        self.config.retries
    }
}
