//! Cache-first: serve from the bucket, touch the network only on a miss.

use shelter_core::{Error, RequestDescriptor};

use super::{AgentContext, Handled, ResponseSource, lookup, store_response};
use crate::plugins::PluginChain;

/// Statuses stored when no cacheability filter is configured.
const DEFAULT_CACHEABLE: &[u16] = &[200];

#[derive(Debug, Clone)]
pub struct CacheFirst {
    cache_name: String,
    plugins: PluginChain,
}

impl CacheFirst {
    pub fn new(cache_name: impl Into<String>, plugins: PluginChain) -> Self {
        Self { cache_name: cache_name.into(), plugins }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn plugins(&self) -> &PluginChain {
        &self.plugins
    }

    /// Serve `request`.
    ///
    /// # Errors
    ///
    /// - `Network`/`FetchTimeout` when the entry is missing and the fetch fails
    /// - `InvalidResponse` when the fetched status is not cacheable
    pub async fn handle(&self, ctx: &AgentContext, request: &RequestDescriptor) -> Result<Handled, Error> {
        let key = request.cache_key();

        if let Some(entry) = lookup(ctx.store(), &self.cache_name, &self.plugins, &key).await {
            tracing::debug!(bucket = %self.cache_name, url = %request.url, "cache hit");
            return Ok(Handled::new(entry.response, ResponseSource::Cache { bucket: self.cache_name.clone() }));
        }

        tracing::debug!(bucket = %self.cache_name, url = %request.url, "cache miss; fetching");
        let response = ctx.fetcher().fetch(request).await?;

        if !self.plugins.cache_will_update(&response, DEFAULT_CACHEABLE) {
            return Err(Error::InvalidResponse(response.status));
        }

        store_response(ctx.store(), &self.cache_name, &self.plugins, request, &response, false).await;
        Ok(Handled::new(response, ResponseSource::Network))
    }
}
