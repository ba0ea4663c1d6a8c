//! HTTP transport seam
//!
//! The executor talks to the wire through the `Transport` trait so tests can
//! script responses deterministically and the production path stays a thin
//! reqwest wrapper. Header names are lowercased on both sides so lookups
//! never depend on vendor casing.
//!
//! Returns use `Pin<Box<dyn Future>>` for dyn-compatibility
//! (`Arc<dyn Transport>` shared across concurrent calls).

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// HTTP methods the client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Outgoing request envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Response envelope with lowercased header names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    /// Bare 200 response for synthesized cache hits and tests.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// How a transport-level failure happened, for error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Other,
}

/// Transport-level failure: the request never produced a vendor response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Connect,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Other,
            message: message.into(),
        }
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

/// Wire-level contract between the executor and HTTP.
pub trait Transport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + 'a>>;
}

/// Production transport over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the configured user agent.
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::other(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn execute<'a>(
        &'a self,
        request: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = match request.method {
                Method::Get => self.client.get(&request.url),
                Method::Post => self.client.post(&request.url),
            };

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            builder = builder.timeout(request.timeout);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::timeout(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    TransportError::connect(format!("connection failed: {e}"))
                } else {
                    TransportError::other(format!("request failed: {e}"))
                }
            })?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
                })
                .collect();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::other(format!("reading response body: {e}")))?;

            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names_are_lowercased() {
        let request =
            ApiRequest::get("https://api.forge.example/repos/a/b").with_header("Accept", "json");
        assert_eq!(request.headers.get("accept").map(String::as_str), Some("json"));
        assert!(!request.headers.contains_key("Accept"));
    }

    #[test]
    fn builders_compose() {
        let request = ApiRequest::post("https://api.forge.example/graphql")
            .with_body("{}")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body.as_deref(), Some("{}"));
        assert_eq!(request.timeout, Duration::from_secs(5));
    }

    #[test]
    fn response_success_range() {
        assert!(ApiResponse::ok("{}").is_success());
        assert!(
            !ApiResponse {
                status: 404,
                headers: BTreeMap::new(),
                body: String::new()
            }
            .is_success()
        );
    }

    #[test]
    fn transport_error_kinds() {
        assert_eq!(
            TransportError::timeout("t").kind,
            TransportErrorKind::Timeout
        );
        assert_eq!(
            TransportError::connect("c").kind,
            TransportErrorKind::Connect
        );
        assert_eq!(TransportError::other("o").kind, TransportErrorKind::Other);
    }

    #[tokio::test]
    async fn mock_transport_scripts_in_order() {
        use super::mock::MockTransport;

        let transport = MockTransport::new();
        transport.push(MockTransport::status(500, "boom"));
        transport.push(MockTransport::status(200, "ok"));

        let first = transport
            .execute(ApiRequest::get("http://x/1"))
            .await
            .unwrap();
        let second = transport
            .execute(ApiRequest::get("http://x/2"))
            .await
            .unwrap();

        assert_eq!(first.status, 500);
        assert_eq!(second.status, 200);
        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.requests()[1].url, "http://x/2");
    }
}
