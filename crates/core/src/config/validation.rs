//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::collections::HashSet;

use crate::config::{AppConfig, ROUTE_BUCKETS};
use crate::request::{canonicalize, resolve};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent`, `precache_bucket` or `broadcast_channel` is empty
    /// - `precache_bucket` names a runtime route bucket
    /// - `scope` or `data_url` is not an absolute http(s) URL
    /// - the navigation fallback is not part of the precache manifest
    /// - expiration bounds are zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.precache_bucket.is_empty() {
            return Err(invalid("precache_bucket", "must not be empty"));
        }
        if ROUTE_BUCKETS.contains(&self.precache_bucket.as_str()) {
            return Err(invalid("precache_bucket", format!("{} is a runtime route bucket", self.precache_bucket)));
        }
        if self.broadcast_channel.is_empty() {
            return Err(invalid("broadcast_channel", "must not be empty"));
        }

        if !self.scope.contains("://") {
            return Err(invalid("scope", "must be an absolute URL"));
        }
        let scope = canonicalize(&self.scope).map_err(|e| invalid("scope", e.to_string()))?;
        canonicalize(&self.data_url).map_err(|e| invalid("data_url", e.to_string()))?;

        let mut manifest_urls = HashSet::new();
        for entry in &self.precache {
            let url = resolve(&entry.url, &scope).map_err(|e| invalid("precache", format!("{}: {e}", entry.url)))?;
            manifest_urls.insert(url);
        }

        let shell = resolve(&self.navigation_fallback, &scope).map_err(|e| invalid("navigation_fallback", e.to_string()))?;
        if !manifest_urls.contains(&shell) {
            return Err(invalid("navigation_fallback", format!("{} is not in the precache manifest", shell)));
        }

        if self.static_assets.max_entries == Some(0) {
            return Err(invalid("static_assets.max_entries", "must be greater than 0"));
        }
        if self.static_assets.max_age_seconds == Some(0) {
            return Err(invalid("static_assets.max_age_seconds", "must be greater than 0"));
        }

        if let Some(quota) = self.quota_bytes
            && quota < 64 * 1024
        {
            tracing::warn!(quota_bytes = quota, "quota below 64KiB; most writes will be rejected");
        }

        Ok(())
    }
}
