//! Request descriptors.
//!
//! A [`RequestDescriptor`] is what the agent sees of an incoming request:
//! method, canonical URL, destination type, and request mode. Descriptors are
//! immutable once built and are the only input route predicates inspect.

pub mod url;

use std::fmt;
use std::str::FromStr;

use ::url::Url;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::hash::compute_cache_key;

pub use self::url::{UrlError, canonicalize, resolve};

/// What kind of resource the requesting context expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Image,
    Font,
    Script,
    Style,
    Manifest,
    #[default]
    Empty,
    Other,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Document => "document",
            Destination::Image => "image",
            Destination::Font => "font",
            Destination::Script => "script",
            Destination::Style => "style",
            Destination::Manifest => "manifest",
            Destination::Empty => "",
            Destination::Other => "other",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Destination {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" => Ok(Destination::Document),
            "image" => Ok(Destination::Image),
            "font" => Ok(Destination::Font),
            "script" => Ok(Destination::Script),
            "style" => Ok(Destination::Style),
            "manifest" => Ok(Destination::Manifest),
            "" | "empty" => Ok(Destination::Empty),
            "other" => Ok(Destination::Other),
            other => Err(crate::Error::InvalidInput(format!("unknown destination: {other}"))),
        }
    }
}

/// Request mode; `Navigate` marks a top-level document load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    #[default]
    NoCors,
    Cors,
}

/// An incoming request as seen by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Upper-case HTTP method.
    pub method: String,
    /// Canonical URL (no fragment, lowercase host).
    pub url: Url,
    pub destination: Destination,
    pub mode: RequestMode,
}

impl RequestDescriptor {
    /// Build a request for an already parsed URL.
    pub fn new(method: &str, url: Url, destination: Destination, mode: RequestMode) -> Self {
        let mut url = url;
        url.set_fragment(None);
        Self { method: method.to_ascii_uppercase(), url, destination, mode }
    }

    /// A plain `GET` subresource request for an absolute URL.
    pub fn get(url: &str) -> Result<Self, crate::Error> {
        let url = canonicalize(url)?;
        Ok(Self::new("GET", url, Destination::Empty, RequestMode::NoCors))
    }

    /// A top-level navigation request for an absolute URL.
    pub fn navigation(url: &str) -> Result<Self, crate::Error> {
        let url = canonicalize(url)?;
        Ok(Self::new("GET", url, Destination::Document, RequestMode::Navigate))
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Serialized origin, e.g. `https://fonts.gstatic.com`.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Cache key for this request (method + canonical URL).
    pub fn cache_key(&self) -> String {
        compute_cache_key(&self.method, self.url.as_str())
    }
}
