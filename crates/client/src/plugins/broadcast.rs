//! Update notifications for revalidated entries.
//!
//! Subscribers (the hosting page) receive a [`CacheUpdate`] whenever a
//! revalidation replaced an entry with different content.

use serde::{Deserialize, Serialize};
use shelter_core::{CacheEntry, CachedResponse};
use tokio::sync::broadcast;

/// Headers compared to decide whether two responses differ.
const HEADERS_TO_CHECK: &[&str] = &["content-length", "etag", "last-modified"];

const CHANNEL_CAPACITY: usize = 16;

/// Message sent on the update channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    pub channel: String,
    pub bucket: String,
    pub key: String,
    pub url: String,
}

/// Broadcasts [`CacheUpdate`]s on a named channel.
#[derive(Debug, Clone)]
pub struct BroadcastUpdate {
    channel_name: String,
    sender: broadcast::Sender<CacheUpdate>,
}

impl BroadcastUpdate {
    pub fn new(channel_name: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { channel_name: channel_name.into(), sender }
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.sender.subscribe()
    }

    /// Announce a changed entry. Returns whether a message was sent.
    ///
    /// First writes (no previous entry) and unchanged content are silent.
    pub fn notify(&self, bucket: &str, old: Option<&CacheEntry>, new: &CacheEntry) -> bool {
        let Some(old) = old else {
            return false;
        };
        if !responses_differ(&old.response, &new.response) {
            return false;
        }

        let update = CacheUpdate {
            kind: "CACHE_UPDATED".to_string(),
            channel: self.channel_name.clone(),
            bucket: bucket.to_string(),
            key: new.key.clone(),
            url: new.url.clone(),
        };

        match self.sender.send(update) {
            Ok(receivers) => {
                tracing::debug!(channel = %self.channel_name, bucket, url = %new.url, receivers, "broadcast cache update");
                true
            }
            Err(_) => {
                tracing::debug!(channel = %self.channel_name, bucket, "cache update with no subscribers");
                false
            }
        }
    }
}

/// Compare validator headers; fall back to the body when neither response
/// carries any of them.
pub fn responses_differ(old: &CachedResponse, new: &CachedResponse) -> bool {
    let has_validators = HEADERS_TO_CHECK
        .iter()
        .any(|name| old.header(name).is_some() || new.header(name).is_some());

    if has_validators {
        HEADERS_TO_CHECK.iter().any(|name| old.header(name) != new.header(name))
    } else {
        old.body != new.body
    }
}
