//! Cache strategies.
//!
//! Only two policies exist, so [`Strategy`] is a closed enum with a uniform
//! [`Strategy::handle`]. Each variant owns a bucket name and a
//! [`PluginChain`]; the store and network come from the [`AgentContext`].

pub mod cache_first;
pub mod stale_while_revalidate;

use std::sync::Arc;

use shelter_core::{CacheEntry, CacheStore, CachedResponse, Error, RequestDescriptor};
use tokio::task::JoinHandle;

use crate::fetch::Fetcher;
use crate::plugins::PluginChain;

pub use cache_first::CacheFirst;
pub use stale_while_revalidate::StaleWhileRevalidate;

/// Store and network handles shared by every strategy.
#[derive(Clone)]
pub struct AgentContext {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
}

impl AgentContext {
    pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { store, fetcher }
    }

    pub fn store(&self) -> &dyn CacheStore {
        self.store.as_ref()
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }
}

/// Where a response handed back to the caller came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
    /// Served from the precache bucket.
    Precache,
    /// Served from a runtime bucket.
    Cache { bucket: String },
    /// Fetched from the network by a strategy or the precache route.
    Network,
    /// Network failed during a navigation; the shell document was served.
    ShellFallback,
    /// No route matched; plain network fetch.
    Passthrough,
}

impl ResponseSource {
    pub fn label(&self) -> &'static str {
        match self {
            ResponseSource::Precache => "precache",
            ResponseSource::Cache { .. } => "cache",
            ResponseSource::Network => "network",
            ResponseSource::ShellFallback => "shell-fallback",
            ResponseSource::Passthrough => "passthrough",
        }
    }
}

/// A response plus any work still running on its behalf.
#[derive(Debug)]
pub struct Handled {
    pub response: CachedResponse,
    pub source: ResponseSource,
    pending: Option<JoinHandle<()>>,
}

impl Handled {
    pub fn new(response: CachedResponse, source: ResponseSource) -> Self {
        Self { response, source, pending: None }
    }

    pub(crate) fn with_pending(mut self, pending: JoinHandle<()>) -> Self {
        self.pending = Some(pending);
        self
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Wait for background work (revalidation) started by the strategy.
    pub async fn settled(&mut self) {
        if let Some(pending) = self.pending.take()
            && let Err(e) = pending.await
        {
            tracing::warn!(error = %e, "background cache work did not complete");
        }
    }
}

/// A routed caching policy.
#[derive(Debug, Clone)]
pub enum Strategy {
    CacheFirst(CacheFirst),
    StaleWhileRevalidate(StaleWhileRevalidate),
}

impl Strategy {
    pub async fn handle(&self, ctx: &AgentContext, request: &RequestDescriptor) -> Result<Handled, Error> {
        match self {
            Strategy::CacheFirst(strategy) => strategy.handle(ctx, request).await,
            Strategy::StaleWhileRevalidate(strategy) => strategy.handle(ctx, request).await,
        }
    }

    pub fn cache_name(&self) -> &str {
        match self {
            Strategy::CacheFirst(strategy) => strategy.cache_name(),
            Strategy::StaleWhileRevalidate(strategy) => strategy.cache_name(),
        }
    }

    pub fn plugins(&self) -> &PluginChain {
        match self {
            Strategy::CacheFirst(strategy) => strategy.plugins(),
            Strategy::StaleWhileRevalidate(strategy) => strategy.plugins(),
        }
    }
}

impl From<CacheFirst> for Strategy {
    fn from(strategy: CacheFirst) -> Self {
        Strategy::CacheFirst(strategy)
    }
}

impl From<StaleWhileRevalidate> for Strategy {
    fn from(strategy: StaleWhileRevalidate) -> Self {
        Strategy::StaleWhileRevalidate(strategy)
    }
}

/// Read an entry and run the pre-serve hooks.
///
/// Store read failures degrade to a miss.
async fn lookup(store: &dyn CacheStore, bucket: &str, plugins: &PluginChain, key: &str) -> Option<CacheEntry> {
    match store.get(bucket, key).await {
        Ok(Some(entry)) => plugins.cached_response_will_be_used(store, bucket, entry).await,
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(bucket, error = %e, "cache read failed; treating as miss");
            None
        }
    }
}

/// Store an accepted response and run the post-store hooks.
///
/// Returns whether the write happened. Write failures (quota included) are
/// logged; the caller still gets its response.
async fn store_response(
    store: &dyn CacheStore, bucket: &str, plugins: &PluginChain, request: &RequestDescriptor,
    response: &CachedResponse, notify: bool,
) -> bool {
    let key = request.cache_key();
    let old = if notify { store.get(bucket, &key).await.ok().flatten() } else { None };

    let entry = CacheEntry::new(key, request.url.as_str(), response.clone());
    if let Err(e) = store.put(bucket, &entry).await {
        tracing::warn!(bucket, url = %request.url, error = %e, "failed to store response");
        return false;
    }

    plugins.cache_did_update(store, bucket, old.as_ref(), &entry, notify).await;
    true
}
