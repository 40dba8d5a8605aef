//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHELTER_*)
//! 2. TOML config file (if SHELTER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Endpoint serving the timetable data consumed by the hosting page.
pub const DEFAULT_DATA_URL: &str = "https://script.google.com/macros/s/AKfycbzB-Q2T4Tg8yAjatGip2nO0ktkACiM6LXDCPwBo3Gf57PZH907_FmTcupuAsVMKRp2o/exec";

/// Bucket for images and fonts.
pub const STATIC_ASSETS_BUCKET: &str = "static-assets-v2";
/// Bucket for Google Fonts stylesheets and font files.
pub const GOOGLE_FONTS_BUCKET: &str = "google-fonts-v1";
/// Bucket for the remote timetable data.
pub const TIMETABLE_DATA_BUCKET: &str = "timetable-data-v2";

/// Buckets written by runtime routes. The precache bucket must not be one of these.
pub const ROUTE_BUCKETS: &[&str] = &[STATIC_ASSETS_BUCKET, GOOGLE_FONTS_BUCKET, TIMETABLE_DATA_BUCKET];

/// One precache manifest entry.
///
/// `revision: None` marks the URL as immutable: once stored it is never
/// fetched again by this manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheEntry {
    pub url: String,
    #[serde(default)]
    pub revision: Option<String>,
}

impl PrecacheEntry {
    pub fn immutable(url: &str) -> Self {
        Self { url: url.to_string(), revision: None }
    }

    pub fn revisioned(url: &str, revision: &str) -> Self {
        Self { url: url.to_string(), revision: Some(revision.to_string()) }
    }
}

/// Entry-count and entry-age bounds for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationConfig {
    pub max_entries: Option<usize>,
    pub max_age_seconds: Option<u64>,
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self { max_entries: Some(100), max_age_seconds: Some(30 * 24 * 60 * 60) }
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHELTER_*)
/// 2. TOML config file (if SHELTER_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via SHELTER_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Upper bound on the cache database size in bytes.
    ///
    /// Set via SHELTER_QUOTA_BYTES environment variable.
    #[serde(default)]
    pub quota_bytes: Option<u64>,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via SHELTER_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via SHELTER_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via SHELTER_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Base URL of the hosting application; relative manifest URLs resolve
    /// against it.
    ///
    /// Set via SHELTER_SCOPE environment variable.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Remote data endpoint cached with stale-while-revalidate.
    ///
    /// Set via SHELTER_DATA_URL environment variable.
    #[serde(default = "default_data_url")]
    pub data_url: String,

    /// Bucket holding the precached application shell.
    #[serde(default = "default_precache_bucket")]
    pub precache_bucket: String,

    /// Shell document served to offline navigations.
    #[serde(default = "default_navigation_fallback")]
    pub navigation_fallback: String,

    /// Precache manifest.
    #[serde(default = "default_precache")]
    pub precache: Vec<PrecacheEntry>,

    /// Expiration bounds for images and fonts.
    #[serde(default)]
    pub static_assets: ExpirationConfig,

    /// Channel announcing timetable data updates.
    #[serde(default = "default_broadcast_channel")]
    pub broadcast_channel: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shelter-cache.sqlite")
}

fn default_user_agent() -> String {
    "shelter/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_scope() -> String {
    "http://localhost:8080/".into()
}

fn default_data_url() -> String {
    DEFAULT_DATA_URL.into()
}

fn default_precache_bucket() -> String {
    "app-shell-precache-v1".into()
}

fn default_navigation_fallback() -> String {
    "index.html".into()
}

fn default_precache() -> Vec<PrecacheEntry> {
    ["index.html", "manifest.json", "images/icon-192x192.png", "images/icon-512x512.png", "images/org.png"]
        .into_iter()
        .map(PrecacheEntry::immutable)
        .collect()
}

fn default_broadcast_channel() -> String {
    "timetable-updates".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            quota_bytes: None,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            scope: default_scope(),
            data_url: default_data_url(),
            precache_bucket: default_precache_bucket(),
            navigation_fallback: default_navigation_fallback(),
            precache: default_precache(),
            static_assets: ExpirationConfig::default(),
            broadcast_channel: default_broadcast_channel(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SHELTER_`
    /// 2. TOML file from `SHELTER_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHELTER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHELTER_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::from_figment(figment)
    }

    /// Extract and validate a configuration from an assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
