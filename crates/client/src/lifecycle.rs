//! Agent lifecycle: states, transitions, control messages, bucket sweep.

use std::fmt;

use serde::{Deserialize, Serialize};
use shelter_core::{CacheStore, Error};

/// Lifecycle state of an agent version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Parsed,
    Installing,
    /// Installed; waiting for the previous version to release its clients.
    Waiting,
    Activating,
    Active,
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        }
    }

    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        matches!(
            (self, next),
            (Parsed, Installing)
                | (Installing, Waiting)
                | (Waiting, Activating)
                | (Activating, Active)
                | (Installing | Waiting | Activating | Active, Redundant)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State machine guarded by the agent's lifecycle lock.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: LifecycleState,
    skip_waiting: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the transition is not allowed from the current state.
    pub fn transition(&mut self, next: LifecycleState) -> Result<(), Error> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidState(format!("cannot move from {} to {next}", self.state)));
        }

        tracing::info!(from = %self.state, to = %next, "lifecycle transition");
        self.state = next;
        Ok(())
    }

    /// Remember that activation should not wait once install completes.
    pub fn request_skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }
}

/// Control messages accepted from the hosting page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMessage {
    SkipWaiting,
}

impl AgentMessage {
    /// Decode a message; anything unrecognised yields `None`.
    pub fn parse(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Delete every bucket not named in `whitelist`.
///
/// Returns the deleted bucket names. Failures are logged and skipped.
pub async fn sweep_buckets(store: &dyn CacheStore, whitelist: &[String]) -> Vec<String> {
    let existing = match store.list_buckets().await {
        Ok(buckets) => buckets,
        Err(e) => {
            tracing::warn!(error = %e, "failed to list buckets; skipping sweep");
            return Vec::new();
        }
    };

    let mut deleted = Vec::new();
    for bucket in existing.into_iter().filter(|b| !whitelist.contains(b)) {
        match store.delete_bucket(&bucket).await {
            Ok(true) => {
                tracing::info!(bucket = %bucket, "deleted outdated bucket");
                deleted.push(bucket);
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(bucket = %bucket, error = %e, "failed to delete outdated bucket"),
        }
    }

    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shelter_core::{CacheDb, CacheEntry, CachedResponse, MemoryStore};

    #[test]
    fn test_happy_path_transitions() {
        let mut lifecycle = Lifecycle::new();
        for next in [
            LifecycleState::Installing,
            LifecycleState::Waiting,
            LifecycleState::Activating,
            LifecycleState::Active,
            LifecycleState::Redundant,
        ] {
            lifecycle.transition(next).unwrap();
        }
        assert_eq!(lifecycle.state(), LifecycleState::Redundant);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut lifecycle = Lifecycle::new();
        let result = lifecycle.transition(LifecycleState::Active);
        assert!(matches!(result, Err(Error::InvalidState(_))));
        assert_eq!(lifecycle.state(), LifecycleState::Parsed);

        lifecycle.transition(LifecycleState::Installing).unwrap();
        lifecycle.transition(LifecycleState::Redundant).unwrap();
        assert!(lifecycle.transition(LifecycleState::Installing).is_err());
    }

    #[test]
    fn test_parse_messages() {
        assert_eq!(AgentMessage::parse(&json!({"type": "SKIP_WAITING"})), Some(AgentMessage::SkipWaiting));
        assert_eq!(AgentMessage::parse(&json!({"type": "CLAIM"})), None);
        assert_eq!(AgentMessage::parse(&json!("SKIP_WAITING")), None);
        assert_eq!(AgentMessage::parse(&json!({})), None);
    }

    async fn seed(store: &dyn CacheStore, bucket: &str) {
        let url = "https://app.example.com/a";
        let entry = CacheEntry::new("k", url, CachedResponse::new(url, 200, "a"));
        store.put(bucket, &entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_deletes_unlisted_buckets() {
        let store = MemoryStore::new();
        for bucket in ["static-assets-v1", "static-assets-v2", "google-fonts-v1", "timetable-data-v2"] {
            seed(&store, bucket).await;
        }

        let whitelist: Vec<String> =
            ["static-assets-v2", "google-fonts-v1", "timetable-data-v2", "app-shell-precache-v1"]
                .into_iter()
                .map(String::from)
                .collect();
        let deleted = sweep_buckets(&store, &whitelist).await;

        assert_eq!(deleted, vec!["static-assets-v1".to_string()]);
        let mut remaining = store.list_buckets().await.unwrap();
        remaining.sort();
        assert_eq!(remaining, vec!["google-fonts-v1", "static-assets-v2", "timetable-data-v2"]);
    }

    #[tokio::test]
    async fn test_sweep_on_sqlite() {
        let db = CacheDb::open_in_memory().await.unwrap();
        seed(&db, "old-v1").await;
        seed(&db, "keep").await;

        let deleted = sweep_buckets(&db, &["keep".to_string()]).await;
        assert_eq!(deleted, vec!["old-v1".to_string()]);
        assert_eq!(db.list_buckets().await.unwrap(), vec!["keep"]);
    }
}
