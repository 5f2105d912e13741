//! Remote REST transport.
//!
//! The engine talks to the server only through [`RemoteApi`], so the HTTP client
//! can be swapped for another transport. Responses are classified once here:
//! 2xx is `Ok`, 404 is `SyncError::NotFound`, any other status is
//! `SyncError::Http`, and a call that never completed is `SyncError::Network`.

mod drafts;
mod offline;

pub use drafts::*;
pub use offline::*;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SyncError;
use crate::models::{HttpMethod, PendingAction};

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Path of the health endpoint, relative to the API base.
pub const HEALTH_PATH: &str = "/health";

/// One outgoing call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: HttpMethod,
    /// Path relative to the API base, or an absolute URL
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl RemoteRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, url).with_body(body)
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Canonical request identity used as the response cache key.
    ///
    /// Query pairs are sorted and form-encoded, so the key also replays as a url.
    pub fn cache_key(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let mut pairs = self.query.clone();
        pairs.sort();
        format!("{}?{}", self.url, encode_query(&pairs))
    }
}

fn encode_query(pairs: &[(String, String)]) -> String {
    let mut encoded = url::form_urlencoded::Serializer::new(String::new());
    encoded.extend_pairs(pairs);
    encoded.finish()
}

impl From<&PendingAction> for RemoteRequest {
    fn from(action: &PendingAction) -> Self {
        Self {
            method: action.method,
            url: action.url.clone(),
            query: Vec::new(),
            headers: action.headers.clone(),
            body: action.body.clone(),
        }
    }
}

/// A 2xx reply.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    /// Parsed JSON body; `None` when the body was empty or not JSON
    pub body: Option<Value>,
}

/// Transport seam for the remote draft service.
#[async_trait]
pub trait RemoteApi: Send + Sync + 'static {
    /// Perform one call. Only 2xx replies come back as `Ok`.
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, SyncError>;

    /// Whether the remote is reachable right now.
    async fn health(&self) -> bool {
        self.send(RemoteRequest::get(HEALTH_PATH)).await.is_ok()
    }
}

/// `reqwest`-backed implementation of [`RemoteApi`].
#[derive(Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_key)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}{}", self.base_url, url)
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, SyncError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| SyncError::Network(format!("Bad method: {}", e)))?;
        let url = self.resolve(&request.url);

        let mut builder = self.client.request(method, &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            let body = if text.trim().is_empty() {
                None
            } else {
                serde_json::from_str(&text).ok()
            };
            return Ok(RemoteResponse {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("{} {} -> {}: {}", request.method.as_str(), url, status, text);
        if status == reqwest::StatusCode::NOT_FOUND {
            Err(SyncError::NotFound(format!("{} not found", request.url)))
        } else {
            Err(SyncError::Http {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .map(str::to_string)
                    .unwrap_or(text),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_is_order_independent() {
        let a = RemoteRequest::get("/observations")
            .with_query("page", "2")
            .with_query("limit", "10");
        let b = RemoteRequest::get("/observations")
            .with_query("limit", "10")
            .with_query("page", "2");
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "/observations?limit=10&page=2");
        assert_eq!(RemoteRequest::get("/indicators").cache_key(), "/indicators");
    }

    #[test]
    fn test_cache_key_encodes_reserved_characters() {
        let request = RemoteRequest::get("/schools")
            .with_query("name", "Smith & Sons=1#2")
            .with_query("q", "a b");
        assert_eq!(request.cache_key(), "/schools?name=Smith+%26+Sons%3D1%232&q=a+b");

        let url = reqwest::Url::parse(&format!("http://localhost{}", request.cache_key())).unwrap();
        let decoded: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            decoded,
            vec![
                ("name".to_string(), "Smith & Sons=1#2".to_string()),
                ("q".to_string(), "a b".to_string()),
            ]
        );
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let remote = HttpRemote::new("http://localhost:3000/api/", None);
        assert_eq!(remote.resolve("/observations/draft"), "http://localhost:3000/api/observations/draft");
        assert_eq!(remote.resolve("https://other.test/x"), "https://other.test/x");
    }

    #[test]
    fn test_request_from_pending_action() {
        let action = PendingAction {
            id: 7,
            url: "/observations".to_string(),
            method: HttpMethod::Post,
            headers: BTreeMap::new(),
            body: Some(json!({ "offlineId": "obs-7" })),
            timestamp: chrono::Utc::now(),
        };
        let request = RemoteRequest::from(&action);
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.body, action.body);
    }
}
