//! Stale-while-revalidate: answer from the bucket at once, refresh behind.
//!
//! The network fetch is spawned before the cache lookup so both are in
//! flight together. With a cached entry the caller never waits for the
//! fetch; the refresh (store, expiration, broadcast) finishes on its own.

use shelter_core::{CachedResponse, Error, RequestDescriptor};

use super::{AgentContext, Handled, ResponseSource, lookup, store_response};
use crate::plugins::PluginChain;

/// Statuses stored when no cacheability filter is configured.
const DEFAULT_CACHEABLE: &[u16] = &[0, 200];

#[derive(Debug, Clone)]
pub struct StaleWhileRevalidate {
    cache_name: String,
    plugins: PluginChain,
}

impl StaleWhileRevalidate {
    pub fn new(cache_name: impl Into<String>, plugins: PluginChain) -> Self {
        Self { cache_name: cache_name.into(), plugins }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn plugins(&self) -> &PluginChain {
        &self.plugins
    }

    pub async fn handle(&self, ctx: &AgentContext, request: &RequestDescriptor) -> Result<Handled, Error> {
        let revalidation = tokio::spawn(revalidate(
            ctx.clone(),
            self.cache_name.clone(),
            self.plugins.clone(),
            request.clone(),
        ));

        let key = request.cache_key();
        match lookup(ctx.store(), &self.cache_name, &self.plugins, &key).await {
            Some(entry) => {
                tracing::debug!(bucket = %self.cache_name, url = %request.url, "serving stale; revalidating");
                let bucket = self.cache_name.clone();
                let url = request.url.to_string();
                let pending = tokio::spawn(async move {
                    match revalidation.await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => tracing::warn!(bucket = %bucket, url = %url, error = %e, "background revalidation failed"),
                        Err(e) => tracing::warn!(bucket = %bucket, url = %url, error = %e, "background revalidation aborted"),
                    }
                });
                Ok(Handled::new(entry.response, ResponseSource::Cache { bucket: self.cache_name.clone() })
                    .with_pending(pending))
            }
            None => {
                let response = revalidation
                    .await
                    .map_err(|e| Error::Network(format!("revalidation task failed: {e}")))??;
                Ok(Handled::new(response, ResponseSource::Network))
            }
        }
    }
}

/// Fetch, then store the response if the chain accepts it.
///
/// Non-cacheable responses are still returned to a waiting caller.
async fn revalidate(
    ctx: AgentContext, bucket: String, plugins: PluginChain, request: RequestDescriptor,
) -> Result<CachedResponse, Error> {
    let response = ctx.fetcher().fetch(&request).await?;

    if plugins.cache_will_update(&response, DEFAULT_CACHEABLE) {
        store_response(ctx.store(), &bucket, &plugins, &request, &response, true).await;
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{BroadcastUpdate, CacheableResponse};
    use crate::testing::MockFetcher;
    use shelter_core::{CacheEntry, CacheStore, MemoryStore};
    use std::sync::Arc;
    use std::time::Duration;

    const BUCKET: &str = "timetable-data-v2";
    const DATA: &str = "https://script.google.com/macros/s/abc/exec";

    fn setup() -> (AgentContext, Arc<MemoryStore>, Arc<MockFetcher>) {
        let store = Arc::new(MemoryStore::new());
        let fetcher = MockFetcher::new();
        (AgentContext::new(store.clone(), fetcher.clone()), store, fetcher)
    }

    fn timetable(broadcast: &BroadcastUpdate) -> StaleWhileRevalidate {
        StaleWhileRevalidate::new(
            BUCKET,
            PluginChain::new()
                .with(broadcast.clone())
                .with(CacheableResponse::ok_or_opaque()),
        )
    }

    async fn seed(store: &MemoryStore, body: &str) -> RequestDescriptor {
        let request = RequestDescriptor::get(DATA).unwrap();
        let entry = CacheEntry::new(request.cache_key(), DATA, CachedResponse::new(DATA, 200, body));
        store.put(BUCKET, &entry).await.unwrap();
        request
    }

    #[tokio::test]
    async fn test_cached_response_returned_before_fetch_resolves() {
        let (ctx, store, fetcher) = setup();
        let broadcast = BroadcastUpdate::new("timetable-updates");
        let mut updates = broadcast.subscribe();
        let request = seed(&store, "{\"week\":1}").await;
        fetcher.respond(DATA, 200, "{\"week\":2}");
        let gate = fetcher.gate();

        let mut handled = tokio::time::timeout(Duration::from_secs(1), timetable(&broadcast).handle(&ctx, &request))
            .await
            .expect("handle must not wait for the network")
            .unwrap();

        assert_eq!(handled.source, ResponseSource::Cache { bucket: BUCKET.to_string() });
        assert_eq!(handled.response.body, b"{\"week\":1}");
        assert!(handled.has_pending());

        gate.notify_one();
        handled.settled().await;

        let stored = store.get(BUCKET, &request.cache_key()).await.unwrap().unwrap();
        assert_eq!(stored.response.body, b"{\"week\":2}");

        let update = updates.try_recv().unwrap();
        assert_eq!(update.bucket, BUCKET);
        assert_eq!(update.key, request.cache_key());
    }

    #[tokio::test]
    async fn test_no_cache_waits_for_network() {
        let (ctx, store, fetcher) = setup();
        let broadcast = BroadcastUpdate::new("timetable-updates");
        let mut updates = broadcast.subscribe();
        fetcher.respond(DATA, 200, "fresh");

        let request = RequestDescriptor::get(DATA).unwrap();
        let handled = timetable(&broadcast).handle(&ctx, &request).await.unwrap();

        assert_eq!(handled.source, ResponseSource::Network);
        assert_eq!(handled.response.body, b"fresh");
        assert!(store.get(BUCKET, &request.cache_key()).await.unwrap().is_some());
        assert!(updates.try_recv().is_err(), "first write is not an update");
    }

    #[tokio::test]
    async fn test_no_cache_offline_propagates_error() {
        let (ctx, _store, fetcher) = setup();
        fetcher.set_offline(true);

        let request = RequestDescriptor::get(DATA).unwrap();
        let result = timetable(&BroadcastUpdate::new("timetable-updates")).handle(&ctx, &request).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_background_failure_is_suppressed() {
        let (ctx, store, fetcher) = setup();
        let request = seed(&store, "cached").await;
        fetcher.set_offline(true);

        let mut handled = timetable(&BroadcastUpdate::new("timetable-updates"))
            .handle(&ctx, &request)
            .await
            .unwrap();
        handled.settled().await;

        assert_eq!(handled.response.body, b"cached");
        let stored = store.get(BUCKET, &request.cache_key()).await.unwrap().unwrap();
        assert_eq!(stored.response.body, b"cached");
    }

    #[tokio::test]
    async fn test_error_status_returned_but_not_stored() {
        let (ctx, store, fetcher) = setup();
        fetcher.respond(DATA, 500, "boom");

        let request = RequestDescriptor::get(DATA).unwrap();
        let handled = timetable(&BroadcastUpdate::new("timetable-updates"))
            .handle(&ctx, &request)
            .await
            .unwrap();

        assert_eq!(handled.response.status, 500);
        assert!(store.entries(BUCKET).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_refresh_is_silent() {
        let (ctx, store, fetcher) = setup();
        let broadcast = BroadcastUpdate::new("timetable-updates");
        let mut updates = broadcast.subscribe();
        let request = seed(&store, "same").await;
        fetcher.respond(DATA, 200, "same");

        let mut handled = timetable(&broadcast).handle(&ctx, &request).await.unwrap();
        handled.settled().await;

        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_default_filter_caches_opaque() {
        let (ctx, store, fetcher) = setup();
        let url = "https://fonts.gstatic.com/s/roboto/v30/KFOmCnqEu92Fr1Mu4mxK.woff2";
        fetcher.respond(url, 0, "");

        let request = RequestDescriptor::get(url).unwrap();
        StaleWhileRevalidate::new("google-fonts-v1", PluginChain::new())
            .handle(&ctx, &request)
            .await
            .unwrap();

        assert_eq!(store.entries("google-fonts-v1").await.unwrap().len(), 1);
    }
}
