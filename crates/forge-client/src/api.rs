//! Typed operations over the executor
//!
//! The façade business-logic callers hold: typed get/list/search calls, the
//! GraphQL entry point, and the operational surface (cache stats, cache
//! clear, rate-limit info). Payload structs decode leniently — unknown
//! vendor fields are ignored, missing optional ones default — and a body
//! that cannot decode at all surfaces as a `validation` error from the
//! executor's decode path.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use forge_auth::AuthManager;
use forge_pool::{CredentialPool, PoolHealth};

use crate::cache::CacheStats;
use crate::config::{AuthMode, ClientConfig};
use crate::error::Result;
use crate::executor::{Executor, Operation};
use crate::graphql::GraphqlAdapter;
use crate::rate_limit::{RateLimitBucket, RateLimitSnapshot};
use crate::transport::{ReqwestTransport, Transport};

/// Search results age out faster than resource reads.
const SEARCH_CACHE_TTL: Duration = Duration::from_secs(60);

/// A repository as callers consume it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// A user or organization account.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Account {
    pub id: u64,
    pub login: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub site_admin: bool,
}

/// An issue in a repository.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub comments: u64,
}

/// Paged search results.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResults<T> {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// The resilient forge API client.
pub struct ForgeApi {
    executor: Arc<Executor>,
    graphql: GraphqlAdapter,
}

impl ForgeApi {
    /// Assemble from already-built parts (tests, custom wiring).
    pub fn new(executor: Arc<Executor>, graphql: GraphqlAdapter) -> Self {
        Self { executor, graphql }
    }

    /// Build the full client from configuration with the production
    /// transport. Fails fast on any configuration problem.
    pub fn from_config(config: &ClientConfig) -> forge_common::Result<Self> {
        let transport = ReqwestTransport::new(&config.api.user_agent)
            .map_err(|e| forge_common::Error::Config(format!("building transport: {e}")))?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build from configuration over an injected transport.
    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> forge_common::Result<Self> {
        let credentials = config.credentials()?;
        let auth = match config.auth.mode {
            AuthMode::Installation => {
                AuthManager::with_app(Arc::new(config.app_authenticator()?))
            }
            AuthMode::Static | AuthMode::Oauth => AuthManager::new(),
        };
        let pool = Arc::new(CredentialPool::with_default_strategy(credentials));
        let executor = Arc::new(Executor::new(
            config.executor_options(),
            transport,
            pool,
            auth,
        ));
        let graphql = GraphqlAdapter::new(config.graphql_url(), config.default_cache_ttl());
        Ok(Self { executor, graphql })
    }

    /// Fetch a repository by owner and name.
    pub async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository> {
        let path = format!(
            "/repos/{}/{}",
            urlencoding::encode(owner),
            urlencoding::encode(name)
        );
        self.executor
            .execute_json(Operation::get("repository.get", path))
            .await
    }

    /// Fetch an account by login.
    pub async fn get_account(&self, login: &str) -> Result<Account> {
        let path = format!("/users/{}", urlencoding::encode(login));
        self.executor
            .execute_json(Operation::get("account.get", path))
            .await
    }

    /// List one page of a repository's issues.
    pub async fn list_repository_issues(
        &self,
        owner: &str,
        name: &str,
        page: u32,
    ) -> Result<Vec<Issue>> {
        let path = format!(
            "/repos/{}/{}/issues?page={page}&per_page=100",
            urlencoding::encode(owner),
            urlencoding::encode(name)
        );
        self.executor
            .execute_json(Operation::get("issues.list", path))
            .await
    }

    /// Search repositories. Uses the search quota bucket and a short cache
    /// TTL, since result sets churn quickly.
    pub async fn search_repositories(
        &self,
        query: &str,
        page: u32,
    ) -> Result<SearchResults<Repository>> {
        let path = format!(
            "/search/repositories?q={}&page={page}",
            urlencoding::encode(query)
        );
        self.executor
            .execute_json(
                Operation::get("search.repositories", path)
                    .with_bucket(RateLimitBucket::Search)
                    .with_cache_ttl(SEARCH_CACHE_TTL),
            )
            .await
    }

    /// Run a GraphQL query document with variables.
    pub async fn graphql<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        self.graphql.query(&self.executor, document, variables).await
    }

    /// Cache counters for operational visibility.
    pub async fn cache_stats(&self) -> CacheStats {
        self.executor.cache_stats().await
    }

    /// Drop all cached responses (test isolation, cache busting).
    pub async fn clear_cache(&self) {
        self.executor.clear_cache().await;
    }

    /// Latest known quota per bucket.
    pub async fn rate_limit_info(
        &self,
    ) -> std::collections::HashMap<RateLimitBucket, RateLimitSnapshot> {
        self.executor.rate_limit_info().await
    }

    /// Credential pool health.
    pub async fn pool_health(&self) -> PoolHealth {
        self.executor.pool_health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorOptions;
    use crate::retry::{Backoff, RetryConfig};
    use crate::transport::mock::MockTransport;
    use forge_auth::Credential;

    fn api(transport: Arc<MockTransport>) -> ForgeApi {
        let pool = Arc::new(CredentialPool::with_default_strategy(vec![
            Credential::static_token("primary", "tok_1"),
        ]));
        let executor = Arc::new(Executor::new(
            ExecutorOptions {
                retry: RetryConfig {
                    backoff: Backoff::Fixed {
                        delay: Duration::from_millis(1),
                    },
                    ..RetryConfig::default()
                },
                ..ExecutorOptions::default()
            },
            transport,
            pool,
            AuthManager::new(),
        ));
        let graphql = GraphqlAdapter::new(
            "https://api.forge.example/graphql",
            Duration::from_secs(60),
        );
        ForgeApi::new(executor, graphql)
    }

    const REPO_BODY: &str = r#"{
        "id": 42,
        "full_name": "acme/anvil",
        "private": false,
        "fork": false,
        "description": "drop on coyotes",
        "default_branch": "main",
        "watchers": 7,
        "open_issues": 3
    }"#;

    #[tokio::test]
    async fn get_repository_hits_expected_path() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockTransport::status(200, REPO_BODY));
        let api = api(transport.clone());

        let repo = api.get_repository("acme", "anvil").await.unwrap();

        assert_eq!(repo.id, 42);
        assert_eq!(repo.full_name, "acme/anvil");
        assert_eq!(repo.default_branch.as_deref(), Some("main"));
        assert_eq!(
            transport.requests()[0].url,
            "https://api.forge.example/repos/acme/anvil"
        );
    }

    #[tokio::test]
    async fn unknown_vendor_fields_are_ignored() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockTransport::status(200, REPO_BODY));
        let api = api(transport);

        // REPO_BODY carries watchers/open_issues which the struct drops.
        let repo = api.get_repository("acme", "anvil").await.unwrap();
        assert_eq!(repo.description.as_deref(), Some("drop on coyotes"));
    }

    #[tokio::test]
    async fn get_account_decodes_kind() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockTransport::status(
            200,
            r#"{"id":1,"login":"coyote","type":"User","site_admin":false}"#,
        ));
        let api = api(transport.clone());

        let account = api.get_account("coyote").await.unwrap();
        assert_eq!(account.login, "coyote");
        assert_eq!(account.kind, "User");
        assert_eq!(
            transport.requests()[0].url,
            "https://api.forge.example/users/coyote"
        );
    }

    #[tokio::test]
    async fn list_issues_decodes_page() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockTransport::status(
            200,
            r#"[{"id":1,"number":10,"title":"squeaky","state":"open","comments":2},
                {"id":2,"number":11,"title":"rusty","state":"closed"}]"#,
        ));
        let api = api(transport.clone());

        let issues = api.list_repository_issues("acme", "anvil", 1).await.unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].comments, 2);
        assert_eq!(issues[1].comments, 0, "missing comments defaults to zero");
        assert!(
            transport.requests()[0]
                .url
                .contains("/repos/acme/anvil/issues?page=1")
        );
    }

    #[tokio::test]
    async fn search_encodes_query_and_uses_search_bucket() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockTransport::status_with_headers(
            200,
            r#"{"total_count":1,"incomplete_results":false,"items":[
                {"id":42,"full_name":"acme/anvil"}]}"#,
            &[
                ("x-ratelimit-limit", "30"),
                ("x-ratelimit-remaining", "29"),
                ("x-ratelimit-reset", "1700000000"),
            ],
        ));
        let api = api(transport.clone());

        let results = api.search_repositories("language:rust anvil", 1).await.unwrap();
        assert_eq!(results.total_count, 1);
        assert_eq!(results.items[0].full_name, "acme/anvil");

        let url = &transport.requests()[0].url;
        assert!(
            url.contains("q=language%3Arust%20anvil"),
            "query must be URL-encoded, got: {url}"
        );

        // Without an x-ratelimit-resource header the snapshot lands in the
        // bucket the request was issued against.
        let info = api.rate_limit_info().await;
        assert_eq!(info.get(&RateLimitBucket::Search).unwrap().limit, 30);
        assert!(!info.contains_key(&RateLimitBucket::Core));
    }

    #[tokio::test]
    async fn owner_names_are_path_escaped() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockTransport::status(200, REPO_BODY));
        let api = api(transport.clone());

        let _ = api.get_repository("we ird", "an/vil").await;
        let url = &transport.requests()[0].url;
        assert!(url.contains("/repos/we%20ird/an%2Fvil"), "got: {url}");
    }

    #[tokio::test]
    async fn graphql_round_trips_through_adapter() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockTransport::status(200, r#"{"data":{"viewer":{"login":"coyote"}}}"#));
        let api = api(transport);

        #[derive(Debug, Deserialize)]
        struct Viewer {
            viewer: Login,
        }
        #[derive(Debug, Deserialize)]
        struct Login {
            login: String,
        }

        let data: Viewer = api
            .graphql("query{viewer{login}}", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(data.viewer.login, "coyote");
    }

    #[tokio::test]
    async fn operational_surface_is_exposed() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockTransport::status(200, REPO_BODY));
        let api = api(transport);

        api.get_repository("acme", "anvil").await.unwrap();

        let stats = api.cache_stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);

        api.clear_cache().await;
        assert_eq!(api.cache_stats().await.size, 0);

        let health = api.pool_health().await;
        assert_eq!(health.total, 1);
    }
}
