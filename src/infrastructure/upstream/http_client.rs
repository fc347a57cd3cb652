use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER, USER_AGENT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::domain::DomainError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const BROWSER_ORIGIN: &str = "https://chatgpt.com";
const BROWSER_REFERER: &str = "https://chatgpt.com/";

const PROXY_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

/// Methods the upstream API is called with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(&self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// One outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

/// Raw response; the body is kept as text so non-JSON replies survive
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failure below the HTTP layer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Connection(String),

    /// The client itself could not be built; retrying will not help
    #[error("HTTP client unavailable: {0}")]
    Configuration(String),
}

/// Trait for HTTP transport (for mocking)
#[async_trait]
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Settings of the shared upstream HTTP session
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Validate a proxy URL; empty means no proxy
pub fn validate_proxy_url(proxy: &str) -> Result<Option<String>, DomainError> {
    let proxy = proxy.trim();
    if proxy.is_empty() {
        return Ok(None);
    }

    let scheme = proxy
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .ok_or_else(|| DomainError::configuration(format!("Proxy URL '{}' has no scheme", proxy)))?;

    if !PROXY_SCHEMES.contains(&scheme.as_str()) {
        return Err(DomainError::configuration(format!(
            "Unsupported proxy scheme '{}', expected one of: {}",
            scheme,
            PROXY_SCHEMES.join(", ")
        )));
    }

    Ok(Some(proxy.to_string()))
}

/// reqwest transport owning one lazily created session.
///
/// The session is built on first use; concurrent first calls wait on the
/// same initialization instead of racing to build their own.
#[derive(Debug)]
pub struct ReqwestTransport {
    settings: TransportSettings,
    client: OnceCell<reqwest::Client>,
    sessions_created: AtomicUsize,
}

impl ReqwestTransport {
    pub fn new(settings: TransportSettings) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
            sessions_created: AtomicUsize::new(0),
        }
    }

    /// Number of HTTP sessions built so far
    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::Relaxed)
    }

    async fn client(&self) -> Result<&reqwest::Client, TransportError> {
        self.client
            .get_or_try_init(|| async { self.build_client() })
            .await
    }

    fn build_client(&self) -> Result<reqwest::Client, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(ORIGIN, HeaderValue::from_static(BROWSER_ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static(BROWSER_REFERER));

        let mut builder = reqwest::Client::builder()
            .timeout(self.settings.timeout)
            .default_headers(headers);

        if let Some(proxy) = &self.settings.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| TransportError::Configuration(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let session = self.sessions_created.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            session,
            proxied = self.settings.proxy.is_some(),
            timeout_secs = self.settings.timeout.as_secs(),
            "Creating upstream HTTP session"
        );

        builder
            .build()
            .map_err(|e| TransportError::Configuration(e.to_string()))
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(TransportSettings::default())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let client = self.client().await?;
        let mut builder = client.request(request.method.as_reqwest(), &request.url);

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connection(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connection(format!("failed to read body: {}", e))
            }
        })?;

        Ok(HttpResponse { status, body })
    }
}
