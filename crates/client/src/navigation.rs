//! Offline fallback for top-level navigations.

use shelter_core::{Error, RequestDescriptor};
use url::Url;

use crate::strategy::{AgentContext, Handled, ResponseSource};

/// Serves the precached shell document when a navigation cannot reach the
/// network.
#[derive(Debug, Clone)]
pub struct NavigationFallback {
    bucket: String,
    shell_url: Url,
    shell_key: String,
}

impl NavigationFallback {
    pub fn new(bucket: impl Into<String>, shell_url: Url, shell_key: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), shell_url, shell_key: shell_key.into() }
    }

    pub fn shell_url(&self) -> &Url {
        &self.shell_url
    }

    pub fn applies(&self, request: &RequestDescriptor) -> bool {
        request.method == "GET" && request.is_navigation()
    }

    /// Fetch the page; on a network failure serve the shell instead.
    ///
    /// HTTP error statuses are returned as they are.
    ///
    /// # Errors
    ///
    /// - `CacheMiss` when the network failed and the shell is not stored
    /// - any non-network fetch error
    pub async fn handle(&self, ctx: &AgentContext, request: &RequestDescriptor) -> Result<Handled, Error> {
        let error = match ctx.fetcher().fetch(request).await {
            Ok(response) => return Ok(Handled::new(response, ResponseSource::Network)),
            Err(e) if e.is_network_failure() => e,
            Err(e) => return Err(e),
        };

        tracing::debug!(url = %request.url, error = %error, "navigation offline; serving shell");
        match ctx.store().get(&self.bucket, &self.shell_key).await? {
            Some(entry) => Ok(Handled::new(entry.response, ResponseSource::ShellFallback)),
            None => Err(Error::CacheMiss(format!("{} is not precached", self.shell_url))),
        }
    }
}
