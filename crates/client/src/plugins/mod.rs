//! Plugin chain run around every strategy's fetch/cache cycle.
//!
//! The hook set is fixed:
//!
//! | hook                            | when                               | plugins            |
//! |---------------------------------|------------------------------------|--------------------|
//! | [`PluginChain::cache_will_update`]          | before a response is stored        | cacheability filter |
//! | [`PluginChain::cached_response_will_be_used`] | before a cached entry is served  | expiration         |
//! | [`PluginChain::cache_did_update`]           | after a response was stored        | expiration, broadcast |
//!
//! Plugins run in the order they were added.

pub mod broadcast;
pub mod cacheable;
pub mod expiration;

use shelter_core::{CacheEntry, CacheStore, CachedResponse};

pub use broadcast::{BroadcastUpdate, CacheUpdate};
pub use cacheable::CacheableResponse;
pub use expiration::Expiration;

/// One behavior hooked into a strategy.
#[derive(Debug, Clone)]
pub enum Plugin {
    Cacheable(CacheableResponse),
    Expiration(Expiration),
    Broadcast(BroadcastUpdate),
}

impl From<CacheableResponse> for Plugin {
    fn from(plugin: CacheableResponse) -> Self {
        Plugin::Cacheable(plugin)
    }
}

impl From<Expiration> for Plugin {
    fn from(plugin: Expiration) -> Self {
        Plugin::Expiration(plugin)
    }
}

impl From<BroadcastUpdate> for Plugin {
    fn from(plugin: BroadcastUpdate) -> Self {
        Plugin::Broadcast(plugin)
    }
}

/// Ordered set of plugins attached to one strategy.
#[derive(Debug, Clone, Default)]
pub struct PluginChain {
    plugins: Vec<Plugin>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, plugin: impl Into<Plugin>) -> Self {
        self.plugins.push(plugin.into());
        self
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn expirations(&self) -> impl Iterator<Item = &Expiration> {
        self.plugins.iter().filter_map(|plugin| match plugin {
            Plugin::Expiration(expiration) => Some(expiration),
            _ => None,
        })
    }

    /// Pre-store hook: whether `response` may be written to the bucket.
    ///
    /// Without a cacheability filter the strategy's own default statuses
    /// apply; with filters, every filter must accept.
    pub fn cache_will_update(&self, response: &CachedResponse, default_statuses: &[u16]) -> bool {
        let mut filters = self
            .plugins
            .iter()
            .filter_map(|plugin| match plugin {
                Plugin::Cacheable(filter) => Some(filter),
                _ => None,
            })
            .peekable();

        if filters.peek().is_none() {
            return default_statuses.contains(&response.status);
        }
        filters.all(|filter| filter.is_cacheable(response))
    }

    /// Pre-serve hook: drop entries that outlived an expiration bound.
    ///
    /// A stale entry is not served and triggers a sweep of the bucket.
    pub async fn cached_response_will_be_used(
        &self, store: &dyn CacheStore, bucket: &str, entry: CacheEntry,
    ) -> Option<CacheEntry> {
        for expiration in self.expirations() {
            if !expiration.is_fresh(&entry) {
                tracing::debug!(bucket, url = %entry.url, "cached entry expired");
                expiration.sweep(store, bucket).await;
                return None;
            }
        }
        Some(entry)
    }

    /// Post-store hook.
    ///
    /// Expiration always runs; broadcast plugins only when `notify` is set
    /// (the revalidation path).
    pub async fn cache_did_update(
        &self, store: &dyn CacheStore, bucket: &str, old: Option<&CacheEntry>, new: &CacheEntry, notify: bool,
    ) {
        for plugin in &self.plugins {
            match plugin {
                Plugin::Expiration(expiration) => expiration.sweep(store, bucket).await,
                Plugin::Broadcast(broadcast) if notify => {
                    broadcast.notify(bucket, old, new);
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use shelter_core::MemoryStore;
    use shelter_core::cache::hash::compute_cache_key;
    use std::time::Duration as StdDuration;

    fn entry(url: &str, body: &str) -> CacheEntry {
        CacheEntry::new(compute_cache_key("GET", url), url, CachedResponse::new(url, 200, body))
    }

    #[test]
    fn test_default_statuses_without_filter() {
        let chain = PluginChain::new();
        assert!(chain.cache_will_update(&CachedResponse::new("u", 200, ""), &[200]));
        assert!(!chain.cache_will_update(&CachedResponse::new("u", 0, ""), &[200]));
        assert!(chain.cache_will_update(&CachedResponse::new("u", 0, ""), &[0, 200]));
    }

    #[test]
    fn test_filter_overrides_defaults() {
        let chain = PluginChain::new().with(CacheableResponse::new([0, 200]));
        assert!(chain.cache_will_update(&CachedResponse::new("u", 0, ""), &[200]));
        assert!(!chain.cache_will_update(&CachedResponse::new("u", 404, ""), &[200, 404]));
    }

    #[tokio::test]
    async fn test_stale_entry_not_served() {
        let store = MemoryStore::new();
        let chain = PluginChain::new().with(Expiration::new(None, Some(StdDuration::from_secs(60))));
        let stale = entry("https://example.com/a.png", "a").with_stored_at(Utc::now() - Duration::minutes(5));
        store.put("b", &stale).await.unwrap();

        let served = chain.cached_response_will_be_used(&store, "b", stale.clone()).await;
        assert!(served.is_none());
        assert!(store.get("b", &stale.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fresh_entry_served() {
        let store = MemoryStore::new();
        let chain = PluginChain::new().with(Expiration::new(None, Some(StdDuration::from_secs(60))));
        let fresh = entry("https://example.com/a.png", "a");

        let served = chain.cached_response_will_be_used(&store, "b", fresh.clone()).await;
        assert_eq!(served, Some(fresh));
    }

    #[tokio::test]
    async fn test_broadcast_only_when_notifying() {
        let store = MemoryStore::new();
        let broadcast = BroadcastUpdate::new("timetable-updates");
        let mut rx = broadcast.subscribe();
        let chain = PluginChain::new().with(broadcast);

        let old = entry("https://example.com/data", "v1");
        let new = entry("https://example.com/data", "v2");

        chain.cache_did_update(&store, "b", Some(&old), &new, false).await;
        assert!(rx.try_recv().is_err());

        chain.cache_did_update(&store, "b", Some(&old), &new, true).await;
        let update = rx.try_recv().unwrap();
        assert_eq!(update.bucket, "b");
        assert_eq!(update.key, new.key);
    }
}
