//! Scripted network for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use shelter_core::{CachedResponse, Error, RequestDescriptor};
use tokio::sync::Notify;

use crate::fetch::Fetcher;

/// [`Fetcher`] answering from a table of canned responses.
///
/// Unknown URLs and an offline fetcher fail with [`Error::Network`]. A gate
/// holds every fetch until [`Notify::notify_one`] is called on it.
#[derive(Default)]
pub(crate) struct MockFetcher {
    responses: Mutex<HashMap<String, CachedResponse>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockFetcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &str) {
        self.respond_with(url, CachedResponse::new(url, status, body));
    }

    pub(crate) fn respond_with(&self, url: &str, response: CachedResponse) {
        self.responses.lock().unwrap().insert(url.to_string(), response);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Hold subsequent fetches until the returned gate is notified.
    pub(crate) fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    /// Stop gating fetches that start from now on.
    pub(crate) fn ungate(&self) {
        *self.gate.lock().unwrap() = None;
    }

    pub(crate) fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| u.as_str() == url).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<CachedResponse, Error> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

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
