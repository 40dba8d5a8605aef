//! Entry-count and entry-age bounds for a bucket.
//!
//! Both bounds are enforced lazily: after writes, when a stale entry is about
//! to be served, or on an explicit sweep. Reads of fresh entries never scan.

use std::time::Duration;

use chrono::Utc;
use shelter_core::config::ExpirationConfig;
use shelter_core::{CacheEntry, CacheStore, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiration {
    max_entries: Option<usize>,
    max_age: Option<Duration>,
}

impl Expiration {
    pub fn new(max_entries: Option<usize>, max_age: Option<Duration>) -> Self {
        Self { max_entries, max_age }
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Whether an entry is still within `max_age`.
    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        let Some(max_age) = self.max_age else {
            return true;
        };
        let age = Utc::now().signed_duration_since(entry.stored_at);
        age.to_std().map(|age| age <= max_age).unwrap_or(true)
    }

    /// Delete entries beyond the age bound, then the oldest entries beyond
    /// the count bound. Returns the deleted keys.
    pub async fn expire_entries(&self, store: &dyn CacheStore, bucket: &str) -> Result<Vec<String>, Error> {
        let entries = store.entries(bucket).await?;
        let now = Utc::now();

        let mut doomed = Vec::new();
        let mut kept = Vec::with_capacity(entries.len());
        for meta in entries {
            let too_old = self.max_age.is_some_and(|max_age| {
                now.signed_duration_since(meta.stored_at)
                    .to_std()
                    .map(|age| age > max_age)
                    .unwrap_or(false)
            });
            if too_old { doomed.push(meta.key) } else { kept.push(meta.key) }
        }

        if let Some(max_entries) = self.max_entries
            && kept.len() > max_entries
        {
            let overflow = kept.len() - max_entries;
            doomed.extend(kept.drain(..overflow));
        }

        for key in &doomed {
            store.delete(bucket, key).await?;
        }

        if !doomed.is_empty() {
            tracing::debug!(bucket, evicted = doomed.len(), remaining = kept.len(), "expired cache entries");
        }
        Ok(doomed)
    }

    /// [`Self::expire_entries`] as best-effort housekeeping: failures are
    /// logged and never reach the request that triggered the sweep.
    pub async fn sweep(&self, store: &dyn CacheStore, bucket: &str) {
        if let Err(e) = self.expire_entries(store, bucket).await {
            tracing::warn!(bucket, error = %e, "cache expiration failed");
        }
    }
}

impl From<ExpirationConfig> for Expiration {
    fn from(config: ExpirationConfig) -> Self {
        Self::new(config.max_entries, config.max_age_seconds.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use shelter_core::cache::hash::compute_cache_key;
    use shelter_core::{CacheDb, CachedResponse, MemoryStore};

    fn image(i: usize) -> CacheEntry {
        let url = format!("https://example.com/images/{i}.png");
        CacheEntry::new(compute_cache_key("GET", &url), url.clone(), CachedResponse::new(url, 200, vec![0u8; 8]))
    }

    fn static_assets() -> Expiration {
        Expiration::from(ExpirationConfig::default())
    }

    #[tokio::test]
    async fn test_101st_entry_evicts_oldest() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let expiration = static_assets();

        for i in 0..101 {
            store.put("static-assets-v2", &image(i)).await.unwrap();
        }

        let evicted = expiration.expire_entries(&store, "static-assets-v2").await.unwrap();
        assert_eq!(evicted, vec![image(0).key]);

        let remaining = store.entries("static-assets-v2").await.unwrap();
        assert_eq!(remaining.len(), 100);
        assert_eq!(remaining[0].key, image(1).key);
    }

    #[tokio::test]
    async fn test_age_bound_independent_of_count() {
        let store = MemoryStore::new();
        let expiration = static_assets();
        let old = image(0).with_stored_at(Utc::now() - ChronoDuration::days(31));
        store.put("static-assets-v2", &old).await.unwrap();
        store.put("static-assets-v2", &image(1)).await.unwrap();

        let evicted = expiration.expire_entries(&store, "static-assets-v2").await.unwrap();
        assert_eq!(evicted, vec![old.key.clone()]);
        assert!(store.get("static-assets-v2", &old.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_bounds_keeps_everything() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store.put("b", &image(i)).await.unwrap();
        }
        let evicted = Expiration::new(None, None).expire_entries(&store, "b").await.unwrap();
        assert!(evicted.is_empty());
    }

    #[test]
    fn test_is_fresh() {
        let expiration = static_assets();
        assert!(expiration.is_fresh(&image(0).with_stored_at(Utc::now() - ChronoDuration::days(29))));
        assert!(!expiration.is_fresh(&image(0).with_stored_at(Utc::now() - ChronoDuration::days(31))));
    }

    #[test]
    fn test_from_config() {
        let expiration = static_assets();
        assert_eq!(expiration.max_entries(), Some(100));
        assert_eq!(expiration.max_age(), Some(Duration::from_secs(2_592_000)));
    }
}
