//! Agent fixtures for tool tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rmcp::model::CallToolResult;
use serde::de::DeserializeOwned;
use shelter_client::{Agent, Fetcher};
use shelter_core::{AppConfig, CacheDb, CachedResponse, Error, RequestDescriptor};

const SCOPE: &str = "https://app.example.com/";
const SHELL_FILES: &[&str] =
    &["index.html", "manifest.json", "images/icon-192x192.png", "images/icon-512x512.png", "images/org.png"];

/// Serves canned bodies; unknown URLs and offline mode fail like a dropped
/// connection.
#[derive(Default)]
pub(crate) struct CannedFetcher {
    responses: Mutex<HashMap<String, CachedResponse>>,
    offline: AtomicBool,
}

impl CannedFetcher {
    pub(crate) fn respond(&self, url: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), CachedResponse::new(url, status, body));
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Fetcher for CannedFetcher {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<CachedResponse, Error> {
        let url = request.url.to_string();
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {url}")));
        }
        self.responses
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .ok_or_else(|| Error::Network(format!("connection refused: {url}")))
    }
}

/// Installed agent over an in-memory SQLite store, not yet activated.
pub(crate) async fn waiting_agent() -> (Arc<Agent>, Arc<CannedFetcher>) {
    let fetcher = Arc::new(CannedFetcher::default());
    for file in SHELL_FILES {
        fetcher.respond(&format!("{SCOPE}{file}"), 200, file);
    }

    let config = AppConfig {
        scope: SCOPE.to_string(),
        data_url: "https://script.google.com/macros/s/abc/exec".to_string(),
        ..AppConfig::default()
    };
    let store = Arc::new(CacheDb::open_in_memory().await.unwrap());
    let agent = Agent::from_config(&config, store, fetcher.clone()).unwrap();
    agent.install().await.unwrap();

    (Arc::new(agent), fetcher)
}

pub(crate) async fn active_agent() -> (Arc<Agent>, Arc<CannedFetcher>) {
    let (agent, fetcher) = waiting_agent().await;
    agent.clients_released().await.unwrap();
    (agent, fetcher)
}

/// Decode the JSON text content of a tool result.
pub(crate) fn output_json<T: DeserializeOwned>(result: &CallToolResult) -> T {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    let text = content_val
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
