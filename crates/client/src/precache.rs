//! Install-time precaching of the application shell.
//!
//! Every manifest URL is stored under a cache key derived from its revision.
//! An entry with `revision: None` is immutable: once its key is stored it is
//! never fetched again. Changing a revision produces a new key, and the old
//! key is removed by [`Precache::cleanup`] at activation.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use shelter_core::cache::hash::compute_cache_key;
use shelter_core::config::PrecacheEntry;
use shelter_core::request::resolve;
use shelter_core::{CacheEntry, Error, RequestDescriptor};
use url::Url;

use crate::strategy::{AgentContext, Handled, ResponseSource};

/// Query parameter carrying the revision in a precache key URL.
pub const REVISION_PARAM: &str = "__precache_revision";

/// Query parameters ignored when matching requests against the manifest.
const IGNORED_PARAMS: &[&str] = &["fbclid"];
const IGNORED_PREFIXES: &[&str] = &["utm_"];

/// Document served for directory URLs.
const DIRECTORY_INDEX: &str = "index.html";

/// Outcome of [`Precache::install`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// URLs fetched and stored by this install.
    pub updated: Vec<String>,
    /// URLs whose key was already stored.
    pub not_updated: Vec<String>,
}

#[derive(Debug, Clone)]
struct PrecacheItem {
    url: Url,
    key_url: Url,
    cache_key: String,
}

/// The precache manifest bound to its bucket.
#[derive(Debug, Clone)]
pub struct Precache {
    bucket: String,
    items: Vec<PrecacheItem>,
    by_url: HashMap<String, usize>,
}

impl Precache {
    /// Resolve `manifest` against `scope`.
    ///
    /// # Errors
    ///
    /// - `InvalidUrl` when an entry does not resolve to an http(s) URL
    /// - `InvalidInput` when one URL is listed with two different revisions
    pub fn new(bucket: impl Into<String>, manifest: &[PrecacheEntry], scope: &Url) -> Result<Self, Error> {
        let mut items: Vec<PrecacheItem> = Vec::with_capacity(manifest.len());
        let mut by_url = HashMap::new();

        for entry in manifest {
            let url = resolve(&entry.url, scope)?;
            let key_url = key_url(&url, entry.revision.as_deref());

            if let Some(&existing) = by_url.get(url.as_str()) {
                let existing: &PrecacheItem = &items[existing];
                if existing.key_url != key_url {
                    return Err(Error::InvalidInput(format!(
                        "conflicting precache entries for {url}: {} and {key_url}",
                        existing.key_url
                    )));
                }
                continue;
            }

            by_url.insert(url.to_string(), items.len());
            let cache_key = compute_cache_key("GET", key_url.as_str());
            items.push(PrecacheItem { url, key_url, cache_key });
        }

        Ok(Self { bucket: bucket.into(), items, by_url })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn urls(&self) -> impl Iterator<Item = &Url> {
        self.items.iter().map(|item| &item.url)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Cache key of a manifest URL, exact match only.
    pub fn cache_key_for_url(&self, url: &Url) -> Option<&str> {
        self.by_url.get(url.as_str()).map(|&i| self.items[i].cache_key.as_str())
    }

    /// Fetch and store every manifest entry whose key is not stored yet.
    ///
    /// Responses bypass the route table and the cacheability plugins; only a
    /// `200` is accepted.
    ///
    /// # Errors
    ///
    /// `InstallFailed` when any fetch fails, returns a non-200 status, or
    /// cannot be stored. Entries stored before the failure are kept.
    pub async fn install(&self, ctx: &AgentContext) -> Result<InstallReport, Error> {
        let store = ctx.store();
        store.open_bucket(&self.bucket).await?;

        let mut report = InstallReport::default();
        for item in &self.items {
            if store.get(&self.bucket, &item.cache_key).await?.is_some() {
                report.not_updated.push(item.url.to_string());
                continue;
            }

            let request = RequestDescriptor::get(item.key_url.as_str())?;
            let response = ctx
                .fetcher()
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed(format!("{}: {e}", item.url)))?;

            if response.status != 200 {
                return Err(Error::InstallFailed(format!("{}: status {}", item.url, response.status)));
            }

            let entry = CacheEntry::new(item.cache_key.clone(), item.url.as_str(), response);
            store
                .put(&self.bucket, &entry)
                .await
                .map_err(|e| Error::InstallFailed(format!("{}: {e}", item.url)))?;

            tracing::debug!(bucket = %self.bucket, url = %item.url, "precached");
            report.updated.push(item.url.to_string());
        }

        tracing::info!(
            bucket = %self.bucket,
            updated = report.updated.len(),
            not_updated = report.not_updated.len(),
            "precache installed"
        );
        Ok(report)
    }

    /// Delete keys in the precache bucket that the manifest no longer names.
    ///
    /// Returns the URLs of the removed entries.
    pub async fn cleanup(&self, ctx: &AgentContext) -> Result<Vec<String>, Error> {
        let store = ctx.store();
        let expected: HashSet<&str> = self.items.iter().map(|item| item.cache_key.as_str()).collect();

        let mut deleted = Vec::new();
        for meta in store.entries(&self.bucket).await? {
            if expected.contains(meta.key.as_str()) {
                continue;
            }
            if store.delete(&self.bucket, &meta.key).await? {
                tracing::debug!(bucket = %self.bucket, url = %meta.url, "removed outdated precache entry");
                deleted.push(meta.url);
            }
        }

        Ok(deleted)
    }

    /// Key of the manifest entry `request` refers to, if any.
    ///
    /// Candidates are tried in order: the URL as is, the URL without
    /// tracking parameters, then that URL with a directory index appended.
    pub fn match_request(&self, request: &RequestDescriptor) -> Option<&str> {
        if request.method != "GET" {
            return None;
        }

        let mut candidate = request.url.clone();
        if let Some(key) = self.cache_key_for_url(&candidate) {
            return Some(key);
        }

        strip_ignored_params(&mut candidate);
        if let Some(key) = self.cache_key_for_url(&candidate) {
            return Some(key);
        }

        if candidate.path().ends_with('/') {
            let path = format!("{}{DIRECTORY_INDEX}", candidate.path());
            candidate.set_path(&path);
            return self.cache_key_for_url(&candidate);
        }

        None
    }

    /// Serve a manifest URL from the precache bucket.
    ///
    /// Returns `None` when `request` is not a manifest URL. A manifest URL
    /// missing from the bucket is fetched from the network and not stored.
    pub async fn handle(&self, ctx: &AgentContext, request: &RequestDescriptor) -> Option<Result<Handled, Error>> {
        let key = self.match_request(request)?;

        match ctx.store().get(&self.bucket, key).await {
            Ok(Some(entry)) => {
                tracing::debug!(bucket = %self.bucket, url = %request.url, "precache hit");
                return Some(Ok(Handled::new(entry.response, ResponseSource::Precache)));
            }
            Ok(None) => tracing::debug!(bucket = %self.bucket, url = %request.url, "precache miss; fetching"),
            Err(e) => tracing::warn!(bucket = %self.bucket, error = %e, "precache read failed; fetching"),
        }

        let result = ctx
            .fetcher()
            .fetch(request)
            .await
            .map(|response| Handled::new(response, ResponseSource::Network));
        Some(result)
    }
}

fn key_url(url: &Url, revision: Option<&str>) -> Url {
    let mut key_url = url.clone();
    if let Some(revision) = revision {
        key_url.query_pairs_mut().append_pair(REVISION_PARAM, revision);
    }
    key_url
}

fn strip_ignored_params(url: &mut Url) {
    if url.query().is_none() {
        return;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !is_ignored_param(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}

fn is_ignored_param(name: &str) -> bool {
    IGNORED_PARAMS.contains(&name) || IGNORED_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}
