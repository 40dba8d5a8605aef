//! Status-code cacheability filter.

use std::collections::BTreeSet;

use shelter_core::CachedResponse;

/// Keeps only responses whose status is in the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheableResponse {
    statuses: BTreeSet<u16>,
}

impl CacheableResponse {
    pub fn new(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self { statuses: statuses.into_iter().collect() }
    }

    /// Opaque (0) and OK (200) responses.
    pub fn ok_or_opaque() -> Self {
        Self::new([0, 200])
    }

    pub fn is_cacheable(&self, response: &CachedResponse) -> bool {
        let cacheable = self.statuses.contains(&response.status);
        if !cacheable {
            tracing::debug!(url = %response.url, status = response.status, "response not cacheable");
        }
        cacheable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_or_opaque() {
        let filter = CacheableResponse::ok_or_opaque();
        for (status, expected) in [(0, true), (200, true), (204, false), (304, false), (404, false), (500, false)] {
            let response = CachedResponse::new("https://example.com/", status, "");
            assert_eq!(filter.is_cacheable(&response), expected, "status {status}");
        }
    }
}
