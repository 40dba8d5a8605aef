//! Named-bucket cache store.
//!
//! Buckets map request keys to stored responses. Two backends implement
//! [`CacheStore`]:
//!
//! - [`CacheDb`]: persistent SQLite store via tokio-rusqlite (WAL mode,
//!   automatic schema migrations, optional byte quota)
//! - [`MemoryStore`]: in-process store for tests and ephemeral agents
//!
//! The store is always passed around explicitly as `Arc<dyn CacheStore>`.

pub mod connection;
pub mod entries;
pub mod hash;
pub mod memory;
pub mod migrations;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::Error;
use crate::response::CachedResponse;

pub use connection::CacheDb;
pub use memory::MemoryStore;

/// A stored response together with its key and write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Canonical request URL the entry was stored for.
    pub url: String,
    pub response: CachedResponse,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, url: impl Into<String>, response: CachedResponse) -> Self {
        Self { key: key.into(), url: url.into(), response, stored_at: Utc::now() }
    }

    pub fn with_stored_at(mut self, stored_at: DateTime<Utc>) -> Self {
        self.stored_at = stored_at;
        self
    }

    /// Approximate storage footprint used for quota accounting.
    pub fn size(&self) -> usize {
        self.response.body.len()
            + self
                .response
                .headers
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
            + self.url.len()
    }
}

/// Entry metadata used by expiration sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub key: String,
    pub url: String,
    pub stored_at: DateTime<Utc>,
}

/// Persistent key-value store of named buckets.
///
/// Writes to the same key are last-write-wins. A rewrite moves the entry to
/// the newest position in [`CacheStore::entries`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the bucket if it does not exist yet.
    async fn open_bucket(&self, bucket: &str) -> Result<(), Error>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<CacheEntry>, Error>;

    /// Insert or replace an entry, creating the bucket when needed.
    async fn put(&self, bucket: &str, entry: &CacheEntry) -> Result<(), Error>;

    /// Returns whether an entry was removed.
    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, Error>;

    /// Entries of a bucket, oldest write first.
    async fn entries(&self, bucket: &str) -> Result<Vec<EntryMeta>, Error>;

    async fn list_buckets(&self) -> Result<Vec<String>, Error>;

    /// Returns whether the bucket existed.
    async fn delete_bucket(&self, bucket: &str) -> Result<bool, Error>;
}
