//! Response payloads as stored in and served from the cache.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Status reported for opaque cross-origin responses.
pub const OPAQUE_STATUS: u16 = 0;

/// A complete response: status, headers, and body.
///
/// Header names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Final URL the response was served from.
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { url: url.into(), status, headers: BTreeMap::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_opaque(&self) -> bool {
        self.status == OPAQUE_STATUS
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = CachedResponse::new("https://example.com/", 200, "ok").with_header("ETag", "\"v1\"");
        assert_eq!(response.header("etag"), Some("\"v1\""));
        assert_eq!(response.header("ETAG"), Some("\"v1\""));
    }

    #[test]
    fn test_opaque() {
        assert!(CachedResponse::new("https://cdn.example.com/x", 0, Vec::new()).is_opaque());
        assert!(!CachedResponse::new("https://cdn.example.com/x", 200, Vec::new()).is_opaque());
    }
}
