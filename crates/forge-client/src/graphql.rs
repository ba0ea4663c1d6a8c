//! GraphQL adapter
//!
//! Transport, auth, retry, and caching all belong to the executor; this
//! layer adds the GraphQL-shaped response handling. The vendor answers
//! GraphQL failures with HTTP 200 and an `errors` array, so a 200 body is
//! inspected before it counts as a success, and only validated bodies are
//! written to the cache.
//!
//! Error classification policy (the wire gives no firm contract here, so
//! this is a documented choice, not vendor truth): a `NOT_FOUND` type or
//! extension code maps to `not_found`; parse/validation-style codes map to
//! `validation` (the query itself is at fault); anything else is treated as
//! an execution failure and maps to `server`. Errors with no usable message
//! fall back to a generic one rather than propagating emptiness.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{ApiError, ErrorCategory, RequestContext, Result};
use crate::executor::{Executor, Operation, Origin};
use crate::rate_limit::RateLimitBucket;

/// Error codes that point at the query rather than the execution.
const QUERY_FAULT_CODES: &[&str] = &[
    "GRAPHQL_PARSE_FAILED",
    "GRAPHQL_VALIDATION_FAILED",
    "undefinedField",
    "argumentLiteralsIncompatible",
];

/// GraphQL POST adapter over a shared executor.
pub struct GraphqlAdapter {
    endpoint: String,
    cache_ttl: Duration,
}

impl GraphqlAdapter {
    /// Adapter posting to `endpoint` (a full URL), caching validated
    /// responses for `cache_ttl`.
    pub fn new(endpoint: impl Into<String>, cache_ttl: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            cache_ttl,
        }
    }

    /// Run a query document with variables and decode the `data` payload.
    ///
    /// Concurrent queries are independent: each is its own executor call
    /// with its own cache entry and retry budget, and nothing batches them.
    pub async fn query<T: DeserializeOwned>(
        &self,
        executor: &Executor,
        document: &str,
        variables: Value,
    ) -> Result<T> {
        let payload = json!({
            "query": document,
            "variables": variables,
        })
        .to_string();

        let op = Operation::post("graphql.query", self.endpoint.clone(), payload)
            .with_bucket(RateLimitBucket::Graphql)
            .with_cache_ttl(self.cache_ttl);

        let (ctx, result) = executor.run_for_adapter(&op).await;
        let (response, origin) = result?;

        let body: Value = match serde_json::from_str(&response.body) {
            Ok(value) => value,
            Err(e) => {
                return Err(ApiError::new(
                    ErrorCategory::Validation,
                    format!("GraphQL response is not JSON: {e}"),
                    ctx,
                )
                .with_status(response.status));
            }
        };

        // HTTP 200 with a non-empty errors array is a failure, not a success.
        if let Some(errors) = body.get("errors").and_then(Value::as_array)
            && !errors.is_empty()
        {
            return Err(map_graphql_errors(errors, response.status, ctx));
        }

        let data = match body.get("data") {
            Some(data) if !data.is_null() => data.clone(),
            _ => {
                return Err(ApiError::new(
                    ErrorCategory::Validation,
                    "GraphQL response carried no data",
                    ctx,
                )
                .with_status(response.status));
            }
        };

        match serde_json::from_value::<T>(data) {
            Ok(decoded) => {
                if origin == Origin::Network {
                    executor.store_response(&op, &response.body).await;
                }
                Ok(decoded)
            }
            Err(e) => Err(ApiError::new(
                ErrorCategory::Validation,
                format!("unexpected GraphQL data shape: {e}"),
                ctx,
            )
            .with_status(response.status)),
        }
    }
}

/// Fold the first GraphQL error into an `ApiError`.
fn map_graphql_errors(errors: &[Value], status: u16, ctx: RequestContext) -> ApiError {
    let first = errors.first();

    let message = first
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or("GraphQL query failed")
        .to_string();

    let code = first
        .and_then(|e| {
            e.get("type")
                .or_else(|| e.get("extensions").and_then(|ext| ext.get("code")))
        })
        .and_then(Value::as_str)
        .unwrap_or("");

    let category = if code == "NOT_FOUND" {
        ErrorCategory::NotFound
    } else if QUERY_FAULT_CODES.contains(&code) {
        ErrorCategory::Validation
    } else {
        ErrorCategory::Server
    };

    ApiError::new(category, message, ctx).with_status(status)
}
