//! Network access for the agent.
//!
//! Strategies never talk to reqwest directly; they go through the
//! [`Fetcher`] trait so tests can script the network.
//!
//! ### Failure model
//! - Connection/DNS/TLS failures → [`Error::Network`]
//! - Timeouts → [`Error::FetchTimeout`]
//! - Bodies over `max_bytes` → [`Error::FetchTooLarge`]
//! - HTTP error statuses are *responses*, not errors. Whether they are
//!   cacheable is decided by the plugin chain.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::{Client, Method, header};

use shelter_core::{AppConfig, CachedResponse, Error, RequestDescriptor};

/// Source of network responses.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request and return the complete response.
    async fn fetch(&self, request: &RequestDescriptor) -> Result<CachedResponse, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "shelter/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "shelter/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// reqwest-backed [`Fetcher`].
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    fn too_large(&self, len: usize) -> Error {
        Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes))
    }
}

fn classify(err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(err.to_string())
    } else {
        Error::Network(err.to_string())
    }
}

#[async_trait::async_trait]
impl Fetcher for FetchClient {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<CachedResponse, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {e}", request.method)))?;

        let response = self
            .http
            .request(method, request.url.as_str())
            .send()
            .await
            .map_err(|e| classify(&e))?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(self.too_large(len as usize));
        }

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        let body: Bytes = response.bytes().await.map_err(|e| classify(&e))?;
        if body.len() > self.config.max_bytes {
            return Err(self.too_large(body.len()));
        }

        tracing::debug!(
            url = %request.url,
            status,
            bytes = body.len(),
            content_type = headers.get(header::CONTENT_TYPE.as_str()).map(String::as_str),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(CachedResponse { url: final_url, status, headers, body: body.to_vec() })
    }
}
