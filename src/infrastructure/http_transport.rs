//! HTTP transport seam
//!
//! [`HttpTransport`] sends one request and returns the raw status and body.
//! Retry, politeness and session policy live above it in the page fetcher and
//! the API client. [`ReqwestTransport`] is the production implementation and
//! owns the cookie jar.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, ClientBuilder};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::infrastructure::config::{ApiConfig, SiteConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub json_body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            json_body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            json_body: Some(body),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header(AUTHORIZATION.as_str(), &format!("bearer {token}"))
    }
}

/// Raw response: status, optional Retry-After value and the body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Retry-After in whole seconds, when present and numeric
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after.as_deref().and_then(|v| v.trim().parse().ok())
    }
}

/// Network-level failure; no HTTP status was received
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::Connect(error.to_string())
        } else if error.is_builder() {
            Self::Build(error.to_string())
        } else {
            Self::Request(error.to_string())
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request without retrying
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Drop all session state (cookies). Transports without state do nothing.
    async fn reset_session(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Client settings for [`ReqwestTransport`]
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub default_headers: BTreeMap<String, String>,
    pub cookie_store: bool,
    pub follow_redirects: bool,
}

impl TransportConfig {
    /// Browser-like page client with a cookie jar
    pub fn for_site(site: &SiteConfig) -> Self {
        Self {
            user_agent: site.user_agent.clone(),
            timeout_seconds: site.timeout_seconds,
            default_headers: site.headers.clone(),
            cookie_store: true,
            follow_redirects: true,
        }
    }

    /// JSON API client without cookies
    pub fn for_api(api: &ApiConfig, user_agent: &str) -> Self {
        let mut default_headers = BTreeMap::new();
        default_headers.insert("Accept".to_string(), "application/json".to_string());
        Self {
            user_agent: user_agent.to_string(),
            timeout_seconds: api.timeout_seconds,
            default_headers,
            cookie_store: false,
            follow_redirects: true,
        }
    }
}

/// reqwest-backed transport. The client (and with it the cookie jar) is
/// replaced wholesale by [`HttpTransport::reset_session`].
pub struct ReqwestTransport {
    client: RwLock<Client>,
    config: TransportConfig,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = Self::build_client(&config)?;
        Ok(Self {
            client: RwLock::new(client),
            config,
        })
    }

    fn build_client(config: &TransportConfig) -> Result<Client, TransportError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Build(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Build(format!("invalid header value {value}: {e}")))?;
            headers.insert(name, value);
        }

        ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .cookie_store(config.cookie_store)
            .gzip(true)
            .brotli(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))
    }

    fn current_client(&self) -> Result<Client, TransportError> {
        self.client
            .read()
            .map(|client| client.clone())
            .map_err(|_| TransportError::Request("HTTP client lock poisoned".to_string()))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let client = self.current_client()?;
        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.json_body {
            builder = builder.json(body);
        }

        debug!("🌐 HTTP {:?} {}", request.method, request.url);
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }

    async fn reset_session(&self) -> Result<(), TransportError> {
        let fresh = Self::build_client(&self.config)?;
        let mut guard = self
            .client
            .write()
            .map_err(|_| TransportError::Request("HTTP client lock poisoned".to_string()))?;
        *guard = fresh;
        info!("🍪 HTTP session reset, cookie jar discarded");
        Ok(())
    }
}
