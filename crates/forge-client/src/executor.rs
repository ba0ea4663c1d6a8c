//! Request executor
//!
//! The single choke point every call goes through. Per call the flow is an
//! explicit loop over the state machine `Pending → CacheLookup → {Cached |
//! Fetching} → {Success | Retrying → Fetching | Failed}` with the exit
//! condition owned by the retry policy:
//!
//! 1. Cache lookup (cacheable operations only) — a hit returns immediately,
//!    no credential is selected and nothing touches the wire
//! 2. Select a credential from the pool and materialize its header value
//! 3. Issue the call; fold `x-ratelimit-*` headers into the tracker whether
//!    it succeeded or not
//! 4. On failure, classify into the error taxonomy, report credential
//!    outcomes (auth failure → quarantine, throttle → cooldown) to the pool,
//!    and ask the retry policy whether to sleep and re-enter step 2
//!
//! Every exit is a cache hit, a fresh success, or an `ApiError` — transport
//! errors and vendor bodies never leak through raw. Shared state (cache,
//! pool, tracker) is only mutated in single short lock acquisitions after a
//! response is fully read, so a caller abandoning the future mid-flight
//! cannot leave partial state behind.

use std::sync::Arc;
use std::time::{Duration, Instant};

use forge_auth::AuthManager;
use forge_pool::{CredentialPool, Outcome, PoolHealth};
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cache::{CacheStats, ResponseCache};
use crate::error::{ApiError, ErrorCategory, RequestContext, Result};
use crate::rate_limit::{
    RateLimitBucket, RateLimitSnapshot, RateLimitTracker, ThrottleKind, classify_throttle,
};
use crate::retry::{AttemptFailure, RetryConfig, RetryDecider, RetryDecision, RetryPolicy};
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};

/// One typed call as the executor sees it.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Dotted operation name for contexts, logs, and metrics.
    pub name: &'static str,
    pub method: Method,
    /// Path joined onto the base URL, or a full URL (GraphQL endpoint).
    pub path: String,
    pub body: Option<String>,
    pub bucket: RateLimitBucket,
    pub cacheable: bool,
    /// Per-operation TTL; `None` uses the configured default.
    pub cache_ttl: Option<Duration>,
}

impl Operation {
    /// A cacheable GET against the core bucket.
    pub fn get(name: &'static str, path: impl Into<String>) -> Self {
        Self {
            name,
            method: Method::Get,
            path: path.into(),
            body: None,
            bucket: RateLimitBucket::Core,
            cacheable: true,
            cache_ttl: None,
        }
    }

    /// A POST; not cached unless explicitly opted in.
    pub fn post(name: &'static str, path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name,
            method: Method::Post,
            path: path.into(),
            body: Some(body.into()),
            bucket: RateLimitBucket::Core,
            cacheable: false,
            cache_ttl: None,
        }
    }

    pub fn with_bucket(mut self, bucket: RateLimitBucket) -> Self {
        self.bucket = bucket;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cacheable = true;
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn uncached(mut self) -> Self {
        self.cacheable = false;
        self
    }
}

/// Executor construction knobs, normally derived from the config surface.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub base_url: String,
    pub request_timeout: Duration,
    pub cache_max_size: usize,
    pub default_cache_ttl: Duration,
    pub retry: RetryConfig,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            base_url: String::from("https://api.forge.example"),
            request_timeout: Duration::from_secs(30),
            cache_max_size: 256,
            default_cache_ttl: Duration::from_secs(300),
            retry: RetryConfig::default(),
        }
    }
}

/// Where a returned response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Cache,
    Network,
}

/// The shared, constructor-injected client core. Cheap to share via `Arc`;
/// holds no global state, so tests build isolated instances freely.
pub struct Executor {
    transport: Arc<dyn Transport>,
    pool: Arc<CredentialPool>,
    auth: AuthManager,
    retry: Box<dyn RetryDecider>,
    cache: ResponseCache,
    limits: RateLimitTracker,
    base_url: String,
    request_timeout: Duration,
    default_cache_ttl: Duration,
}

impl Executor {
    pub fn new(
        options: ExecutorOptions,
        transport: Arc<dyn Transport>,
        pool: Arc<CredentialPool>,
        auth: AuthManager,
    ) -> Self {
        Self {
            transport,
            pool,
            auth,
            retry: Box::new(RetryPolicy::new(options.retry)),
            cache: ResponseCache::new(options.cache_max_size),
            limits: RateLimitTracker::new(),
            base_url: options.base_url,
            request_timeout: options.request_timeout,
            default_cache_ttl: options.default_cache_ttl,
        }
    }

    /// Swap in a custom retry decider (throttle handler override).
    pub fn with_retry_decider(mut self, decider: Box<dyn RetryDecider>) -> Self {
        self.retry = decider;
        self
    }

    /// Execute and return the raw response, caching successful bodies of
    /// cacheable operations.
    pub async fn execute(&self, op: Operation) -> Result<ApiResponse> {
        let mut ctx = RequestContext::new(op.name, self.retry.max_retries());
        let (response, origin) = self.run(&op, &mut ctx).await?;
        if origin == Origin::Network {
            self.store_response(&op, &response.body).await;
        }
        Ok(response)
    }

    /// Execute and decode the body. A 2xx body that fails to decode is a
    /// `validation` error — the vendor answered, but not with the expected
    /// contract — and is not cached.
    pub async fn execute_json<T: DeserializeOwned>(&self, op: Operation) -> Result<T> {
        let mut ctx = RequestContext::new(op.name, self.retry.max_retries());
        let (response, origin) = self.run(&op, &mut ctx).await?;
        match serde_json::from_str::<T>(&response.body) {
            Ok(value) => {
                if origin == Origin::Network {
                    self.store_response(&op, &response.body).await;
                }
                Ok(value)
            }
            Err(e) => Err(ApiError::new(
                ErrorCategory::Validation,
                format!("unexpected response shape: {e}"),
                ctx,
            )
            .with_status(response.status)),
        }
    }

    /// Cache counters for operational visibility.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Drop all cached responses (test isolation, cache busting).
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Latest known quota per bucket.
    pub async fn rate_limit_info(
        &self,
    ) -> std::collections::HashMap<RateLimitBucket, RateLimitSnapshot> {
        self.limits.snapshot().await
    }

    /// Credential pool health.
    pub async fn pool_health(&self) -> PoolHealth {
        self.pool.health().await
    }

    /// Run an operation through the adapter seam, leaving caching to the
    /// adapter (GraphQL validates the body before deciding to cache).
    pub(crate) async fn run_for_adapter(
        &self,
        op: &Operation,
    ) -> (RequestContext, Result<(ApiResponse, Origin)>) {
        let mut ctx = RequestContext::new(op.name, self.retry.max_retries());
        let result = self.run(op, &mut ctx).await;
        (ctx, result)
    }

    /// Store a validated response body for a cacheable operation.
    pub(crate) async fn store_response(&self, op: &Operation, body: &str) {
        if op.cacheable {
            let ttl = op.cache_ttl.unwrap_or(self.default_cache_ttl);
            self.cache.insert(self.fingerprint(op), body, ttl).await;
        }
    }

    fn operation_url(&self, op: &Operation) -> String {
        if op.path.starts_with("http://") || op.path.starts_with("https://") {
            op.path.clone()
        } else {
            format!("{}{}", self.base_url.trim_end_matches('/'), op.path)
        }
    }

    /// Request fingerprint: method, full URL, and body identify a call.
    fn fingerprint(&self, op: &Operation) -> String {
        match &op.body {
            Some(body) => format!("{} {} {body}", op.method.as_str(), self.operation_url(op)),
            None => format!("{} {}", op.method.as_str(), self.operation_url(op)),
        }
    }

    /// The per-call state machine loop.
    async fn run(
        &self,
        op: &Operation,
        ctx: &mut RequestContext,
    ) -> Result<(ApiResponse, Origin)> {
        let url = self.operation_url(op);
        let key = self.fingerprint(op);

        if op.cacheable {
            if let Some(body) = self.cache.get(&key).await {
                counter!("forge_cache_hits_total").increment(1);
                counter!("forge_requests_total", "operation" => op.name, "outcome" => "cached")
                    .increment(1);
                debug!(
                    operation = op.name,
                    request_id = %ctx.request_id,
                    "cache hit"
                );
                return Ok((ApiResponse::ok(body), Origin::Cache));
            }
            counter!("forge_cache_misses_total").increment(1);
        }

        loop {
            let credential = match self.pool.select().await {
                Ok(credential) => credential,
                Err(e) => {
                    return Err(self.fail(
                        op,
                        ApiError::new(ErrorCategory::Auth, e.to_string(), ctx.clone()),
                    ));
                }
            };

            let authorization = match self.auth.authorization_for(&credential).await {
                Ok(authorization) => authorization,
                Err(e) => {
                    match self
                        .handle_auth_error(op, &credential, e, ctx)
                        .await
                    {
                        Some(error) => return Err(error),
                        None => continue,
                    }
                }
            };

            let mut request = ApiRequest::new(op.method, url.clone())
                .with_header("authorization", authorization)
                .with_header("accept", "application/vnd.forge+json")
                .with_timeout(self.request_timeout);
            if let Some(body) = &op.body {
                request = request
                    .with_header("content-type", "application/json")
                    .with_body(body.clone());
            }

            debug!(
                operation = op.name,
                request_id = %ctx.request_id,
                attempt = ctx.retry_attempt,
                credential_id = credential.id(),
                "issuing request"
            );

            match self.transport.execute(request).await {
                Ok(response) => {
                    // Quota headers arrive on successes and failures alike.
                    self.limits.observe(op.bucket, &response.headers).await;

                    if response.is_success() {
                        self.pool.report(credential.id(), Outcome::Success).await;
                        counter!("forge_requests_total", "operation" => op.name, "outcome" => "success")
                            .increment(1);
                        histogram!("forge_request_duration_seconds", "operation" => op.name)
                            .record(ctx.elapsed().as_secs_f64());
                        return Ok((response, Origin::Network));
                    }

                    let throttle =
                        classify_throttle(response.status, &response.headers, &response.body);
                    let category = classify_status(response.status, throttle.is_some());

                    match &throttle {
                        Some(kind) => {
                            self.pool
                                .report(
                                    credential.id(),
                                    Outcome::RateLimited {
                                        until: throttle_deadline(kind),
                                    },
                                )
                                .await;
                        }
                        None if category == ErrorCategory::Auth => {
                            self.pool.report(credential.id(), Outcome::AuthFailure).await;
                        }
                        None => {}
                    }

                    let failure = AttemptFailure {
                        category,
                        http_status: Some(response.status),
                        throttle,
                    };
                    match self.retry.decide(&failure, ctx) {
                        RetryDecision::Retry { delay } => {
                            self.note_retry(op, ctx, category, delay).await;
                        }
                        RetryDecision::Stop => {
                            let mut error = ApiError::new(
                                category,
                                vendor_message(&response),
                                ctx.clone(),
                            )
                            .with_status(response.status);
                            if matches!(
                                category,
                                ErrorCategory::Network
                                    | ErrorCategory::Server
                                    | ErrorCategory::RateLimit
                            ) {
                                error = error.retryable();
                            }
                            return Err(self.fail(op, error));
                        }
                    }
                }
                Err(transport_error) => {
                    let failure = AttemptFailure {
                        category: ErrorCategory::Network,
                        http_status: None,
                        throttle: None,
                    };
                    match self.retry.decide(&failure, ctx) {
                        RetryDecision::Retry { delay } => {
                            self.note_retry(op, ctx, ErrorCategory::Network, delay).await;
                        }
                        RetryDecision::Stop => {
                            return Err(self.fail(
                                op,
                                ApiError::new(
                                    ErrorCategory::Network,
                                    transport_error.to_string(),
                                    ctx.clone(),
                                )
                                .retryable(),
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Credential materialization failed before the wire. Mint transport
    /// problems count as network failures (retryable with backoff, possibly
    /// on another credential); everything else is a terminal auth error.
    async fn handle_auth_error(
        &self,
        op: &Operation,
        credential: &forge_auth::Credential,
        error: forge_auth::Error,
        ctx: &mut RequestContext,
    ) -> Option<ApiError> {
        if matches!(error, forge_auth::Error::InvalidCredentials(_)) {
            self.pool.report(credential.id(), Outcome::AuthFailure).await;
        }

        let category = match error {
            forge_auth::Error::Http(_) => ErrorCategory::Network,
            _ => ErrorCategory::Auth,
        };
        let failure = AttemptFailure {
            category,
            http_status: None,
            throttle: None,
        };
        match self.retry.decide(&failure, ctx) {
            RetryDecision::Retry { delay } => {
                self.note_retry(op, ctx, category, delay).await;
                None
            }
            RetryDecision::Stop => {
                Some(self.fail(op, ApiError::new(category, error.to_string(), ctx.clone())))
            }
        }
    }

    /// Sleep out the backoff and advance the attempt counter. Each call's
    /// backoff is its own sleep; concurrent calls are unaffected.
    async fn note_retry(
        &self,
        op: &Operation,
        ctx: &mut RequestContext,
        category: ErrorCategory,
        delay: Duration,
    ) {
        warn!(
            operation = op.name,
            request_id = %ctx.request_id,
            attempt = ctx.retry_attempt,
            category = category.as_str(),
            delay_ms = delay.as_millis() as u64,
            "retrying after failure"
        );
        counter!("forge_request_retries_total", "operation" => op.name).increment(1);
        ctx.retry_attempt += 1;
        tokio::time::sleep(delay).await;
    }

    fn fail(&self, op: &Operation, error: ApiError) -> ApiError {
        counter!("forge_requests_total", "operation" => op.name, "outcome" => error.category.as_str())
            .increment(1);
        warn!(
            operation = op.name,
            request_id = %error.context.request_id,
            category = error.category.as_str(),
            status = error.http_status.unwrap_or(0),
            attempts = error.context.retry_attempt + 1,
            "request failed"
        );
        error
    }
}

/// Map an HTTP failure status into the taxonomy. Throttles are decided
/// before this (a throttled 403 is `rate_limit`, a bare 403 is `auth`).
fn classify_status(status: u16, throttled: bool) -> ErrorCategory {
    if throttled {
        return ErrorCategory::RateLimit;
    }
    match status {
        401 | 403 => ErrorCategory::Auth,
        404 | 410 => ErrorCategory::NotFound,
        400 | 422 => ErrorCategory::Validation,
        500..=599 => ErrorCategory::Server,
        _ => ErrorCategory::Unknown,
    }
}

/// Pool cooldown deadline for a throttle signal.
fn throttle_deadline(kind: &ThrottleKind) -> Instant {
    match kind {
        ThrottleKind::Primary { reset_at } => {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            Instant::now() + Duration::from_secs(reset_at.saturating_sub(now))
        }
        ThrottleKind::Secondary { retry_after } => Instant::now() + *retry_after,
    }
}

/// Human-readable failure message from a vendor error body.
fn vendor_message(response: &ApiResponse) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&response.body)
        && let Some(message) = value.get("message").and_then(|m| m.as_str())
        && !message.is_empty()
    {
        return message.to_string();
    }
    if response.body.trim().is_empty() {
        format!("vendor returned status {}", response.status)
    } else {
        let mut body = response.body.trim().to_string();
        body.truncate(200);
        body
    }
}
