//! Rate-limit state and throttle classification
//!
//! The vendor reports quota through `x-ratelimit-limit` / `-remaining` /
//! `-reset` headers, scoped to a bucket named by `x-ratelimit-resource`
//! (core, search, graphql). Every response refreshes the tracker so the
//! retry policy always decides with the freshest quota picture.
//!
//! Two throttle signals are modeled separately:
//! - **primary**: the quota for a bucket is spent (`x-ratelimit-remaining: 0`
//!   on a 403/429); the call can resume at the advertised reset time
//! - **secondary**: a short-term abuse throttle; the vendor suggests a wait
//!   via `retry-after` or a recognizable message
//!
//! Distinguishing them matters because each carries its own retry ceiling
//! and wait computation.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

/// Secondary-throttle message fragments in vendor 403/429 bodies.
///
/// These indicate the short-term abuse limiter rather than spent quota.
const SECONDARY_PATTERNS: &[&str] = &[
    "secondary rate limit",
    "abuse detection",
    "please wait a few minutes",
];

/// Fallback wait when the vendor throttles without advertising one.
const DEFAULT_SECONDARY_WAIT: Duration = Duration::from_secs(60);

/// Quota bucket as named by `x-ratelimit-resource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBucket {
    Core,
    Search,
    Graphql,
}

impl RateLimitBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitBucket::Core => "core",
            RateLimitBucket::Search => "search",
            RateLimitBucket::Graphql => "graphql",
        }
    }

    /// Bucket from a `x-ratelimit-resource` value; unknown names fall back
    /// to `fallback` (the bucket the request was issued against).
    pub fn from_resource(value: &str, fallback: RateLimitBucket) -> Self {
        match value {
            "core" => RateLimitBucket::Core,
            "search" => RateLimitBucket::Search,
            "graphql" => RateLimitBucket::Graphql,
            _ => fallback,
        }
    }
}

/// Latest known quota for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp (seconds) at which the quota resets.
    pub reset_at: u64,
}

/// Shared per-bucket quota state, refreshed after every call.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    buckets: RwLock<HashMap<RateLimitBucket, RateLimitSnapshot>>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold response headers into the tracker. Returns the updated snapshot
    /// when the response carried quota headers.
    pub async fn observe(
        &self,
        fallback: RateLimitBucket,
        headers: &BTreeMap<String, String>,
    ) -> Option<RateLimitSnapshot> {
        let limit = parse_header(headers, "x-ratelimit-limit")?;
        let remaining = parse_header(headers, "x-ratelimit-remaining")?;
        let reset_at = parse_header(headers, "x-ratelimit-reset")?;

        let bucket = headers
            .get("x-ratelimit-resource")
            .map(|v| RateLimitBucket::from_resource(v, fallback))
            .unwrap_or(fallback);

        let snapshot = RateLimitSnapshot {
            limit,
            remaining,
            reset_at,
        };
        self.buckets.write().await.insert(bucket, snapshot);
        Some(snapshot)
    }

    /// Latest snapshot for one bucket, if any response reported it yet.
    pub async fn get(&self, bucket: RateLimitBucket) -> Option<RateLimitSnapshot> {
        self.buckets.read().await.get(&bucket).copied()
    }

    /// All known buckets, for the operational read accessor.
    pub async fn snapshot(&self) -> HashMap<RateLimitBucket, RateLimitSnapshot> {
        self.buckets.read().await.clone()
    }
}

fn parse_header<T: std::str::FromStr>(headers: &BTreeMap<String, String>, name: &str) -> Option<T> {
    headers.get(name).and_then(|v| v.trim().parse().ok())
}

/// Which throttle a 403/429 response represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleKind {
    /// Quota spent; resumes at the vendor's reset time (unix seconds).
    Primary { reset_at: u64 },
    /// Short-term throttle; wait the suggested duration.
    Secondary { retry_after: Duration },
}

/// Classify a response as a throttle signal, or `None` when the status is
/// not throttle-shaped (a plain 403 without limit markers is an auth
/// problem, not a rate limit).
pub fn classify_throttle(
    status: u16,
    headers: &BTreeMap<String, String>,
    body: &str,
) -> Option<ThrottleKind> {
    if status != 403 && status != 429 {
        return None;
    }

    // Primary: the bucket is spent and the reset header says when it refills.
    if headers
        .get("x-ratelimit-remaining")
        .is_some_and(|v| v.trim() == "0")
    {
        let reset_at = parse_header(headers, "x-ratelimit-reset").unwrap_or(0);
        return Some(ThrottleKind::Primary { reset_at });
    }

    // Secondary: vendor-suggested wait.
    if let Some(seconds) = parse_header::<u64>(headers, "retry-after") {
        return Some(ThrottleKind::Secondary {
            retry_after: Duration::from_secs(seconds),
        });
    }

    let lower = body.to_lowercase();
    if SECONDARY_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(ThrottleKind::Secondary {
            retry_after: DEFAULT_SECONDARY_WAIT,
        });
    }

    // A bare 429 is still a throttle even without markers; a bare 403 is not.
    if status == 429 {
        return Some(ThrottleKind::Secondary {
            retry_after: DEFAULT_SECONDARY_WAIT,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn observe_parses_quota_headers() {
        let tracker = RateLimitTracker::new();
        let snapshot = tracker
            .observe(
                RateLimitBucket::Core,
                &headers(&[
                    ("x-ratelimit-limit", "5000"),
                    ("x-ratelimit-remaining", "4987"),
                    ("x-ratelimit-reset", "1700000000"),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(snapshot.limit, 5000);
        assert_eq!(snapshot.remaining, 4987);
        assert_eq!(snapshot.reset_at, 1700000000);
        assert_eq!(tracker.get(RateLimitBucket::Core).await, Some(snapshot));
    }

    #[tokio::test]
    async fn observe_routes_to_named_bucket() {
        let tracker = RateLimitTracker::new();
        tracker
            .observe(
                RateLimitBucket::Core,
                &headers(&[
                    ("x-ratelimit-limit", "30"),
                    ("x-ratelimit-remaining", "12"),
                    ("x-ratelimit-reset", "1700000060"),
                    ("x-ratelimit-resource", "search"),
                ]),
            )
            .await;

        assert!(tracker.get(RateLimitBucket::Core).await.is_none());
        let search = tracker.get(RateLimitBucket::Search).await.unwrap();
        assert_eq!(search.limit, 30);
    }

    #[tokio::test]
    async fn observe_without_headers_is_noop() {
        let tracker = RateLimitTracker::new();
        let result = tracker
            .observe(RateLimitBucket::Core, &headers(&[("content-type", "json")]))
            .await;
        assert!(result.is_none());
        assert!(tracker.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn later_observation_replaces_earlier() {
        let tracker = RateLimitTracker::new();
        for remaining in ["10", "9"] {
            tracker
                .observe(
                    RateLimitBucket::Graphql,
                    &headers(&[
                        ("x-ratelimit-limit", "5000"),
                        ("x-ratelimit-remaining", remaining),
                        ("x-ratelimit-reset", "1700000000"),
                    ]),
                )
                .await;
        }
        assert_eq!(
            tracker.get(RateLimitBucket::Graphql).await.unwrap().remaining,
            9
        );
    }

    #[test]
    fn unknown_resource_falls_back_to_request_bucket() {
        assert_eq!(
            RateLimitBucket::from_resource("integration_manifest", RateLimitBucket::Graphql),
            RateLimitBucket::Graphql
        );
        assert_eq!(
            RateLimitBucket::from_resource("search", RateLimitBucket::Core),
            RateLimitBucket::Search
        );
    }

    #[test]
    fn remaining_zero_is_primary() {
        let kind = classify_throttle(
            403,
            &headers(&[
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset", "1700000123"),
            ]),
            "",
        );
        assert_eq!(
            kind,
            Some(ThrottleKind::Primary {
                reset_at: 1700000123
            })
        );
    }

    #[test]
    fn retry_after_is_secondary() {
        let kind = classify_throttle(429, &headers(&[("retry-after", "30")]), "");
        assert_eq!(
            kind,
            Some(ThrottleKind::Secondary {
                retry_after: Duration::from_secs(30)
            })
        );
    }

    #[test]
    fn secondary_message_pattern_is_secondary() {
        let body = r#"{"message":"You have exceeded a secondary rate limit. Please wait."}"#;
        let kind = classify_throttle(403, &headers(&[]), body);
        assert_eq!(
            kind,
            Some(ThrottleKind::Secondary {
                retry_after: DEFAULT_SECONDARY_WAIT
            })
        );
    }

    #[test]
    fn message_match_is_case_insensitive() {
        let body = r#"{"message":"ABUSE DETECTION triggered"}"#;
        assert!(classify_throttle(403, &headers(&[]), body).is_some());
    }

    #[test]
    fn bare_429_defaults_to_secondary() {
        let kind = classify_throttle(429, &headers(&[]), "slow down");
        assert_eq!(
            kind,
            Some(ThrottleKind::Secondary {
                retry_after: DEFAULT_SECONDARY_WAIT
            })
        );
    }

    #[test]
    fn bare_403_is_not_a_throttle() {
        assert_eq!(classify_throttle(403, &headers(&[]), "forbidden"), None);
    }

    #[test]
    fn non_throttle_statuses_are_none() {
        assert_eq!(classify_throttle(500, &headers(&[]), ""), None);
        assert_eq!(classify_throttle(200, &headers(&[]), ""), None);
        assert_eq!(classify_throttle(404, &headers(&[]), ""), None);
    }

    #[test]
    fn primary_beats_retry_after_when_both_present() {
        // Spent quota with a retry-after hint still classifies as primary:
        // the reset time is the authoritative signal.
        let kind = classify_throttle(
            429,
            &headers(&[
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-reset", "1700000500"),
                ("retry-after", "60"),
            ]),
            "",
        );
        assert!(matches!(kind, Some(ThrottleKind::Primary { .. })));
    }
}
