//! In-memory cache store.
//!
//! Same semantics as [`super::CacheDb`] without persistence. Uses a tokio
//! RwLock around a map of buckets; an optional byte quota makes writes fail
//! with [`Error::StorageQuotaExceeded`] once exceeded.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheEntry, CacheStore, EntryMeta};
use crate::Error;

#[derive(Default)]
struct Inner {
    buckets: BTreeMap<String, HashMap<String, (u64, CacheEntry)>>,
    next_seq: u64,
    used_bytes: usize,
}

/// Non-persistent [`CacheStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes once `quota_bytes` would be exceeded.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self { inner: RwLock::new(Inner::default()), quota_bytes: Some(quota_bytes) }
    }

    /// Bytes currently accounted against the quota.
    pub async fn used_bytes(&self) -> usize {
        self.inner.read().await.used_bytes
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open_bucket(&self, bucket: &str) -> Result<(), Error> {
        let mut inner = self.inner.write().await;
        inner.buckets.entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<CacheEntry>, Error> {
        let inner = self.inner.read().await;
        Ok(inner
            .buckets
            .get(bucket)
            .and_then(|entries| entries.get(key))
            .map(|(_, entry)| entry.clone()))
    }

    async fn put(&self, bucket: &str, entry: &CacheEntry) -> Result<(), Error> {
        let mut inner = self.inner.write().await;

        let replaced = inner
            .buckets
            .get(bucket)
            .and_then(|entries| entries.get(&entry.key))
            .map(|(_, old)| old.size())
            .unwrap_or(0);
        let projected = inner.used_bytes - replaced + entry.size();

        if let Some(quota) = self.quota_bytes
            && projected > quota
        {
            return Err(Error::StorageQuotaExceeded(format!("{projected} bytes exceeds quota of {quota}")));
        }

        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.used_bytes = projected;
        inner
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(entry.key.clone(), (seq, entry.clone()));
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, Error> {
        let mut inner = self.inner.write().await;
        let removed = inner.buckets.get_mut(bucket).and_then(|entries| entries.remove(key));
        match removed {
            Some((_, entry)) => {
                inner.used_bytes -= entry.size();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn entries(&self, bucket: &str) -> Result<Vec<EntryMeta>, Error> {
        let inner = self.inner.read().await;
        let Some(entries) = inner.buckets.get(bucket) else {
            return Ok(Vec::new());
        };

        let mut ordered: Vec<&(u64, CacheEntry)> = entries.values().collect();
        ordered.sort_by_key(|(seq, _)| *seq);

        Ok(ordered
            .into_iter()
            .map(|(_, entry)| EntryMeta { key: entry.key.clone(), url: entry.url.clone(), stored_at: entry.stored_at })
            .collect())
    }

    async fn list_buckets(&self) -> Result<Vec<String>, Error> {
        let inner = self.inner.read().await;
        Ok(inner.buckets.keys().cloned().collect())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool, Error> {
        let mut inner = self.inner.write().await;
        match inner.buckets.remove(bucket) {
            Some(entries) => {
                let freed: usize = entries.values().map(|(_, entry)| entry.size()).sum();
                inner.used_bytes -= freed;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
