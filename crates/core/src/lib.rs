//! Core types and shared functionality for shelter.
//!
//! This crate provides:
//! - Request and response model shared by every layer
//! - Cache store trait with SQLite and in-memory backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod request;
pub mod response;

pub use cache::{CacheDb, CacheEntry, CacheStore, EntryMeta, MemoryStore};
pub use config::AppConfig;
pub use error::Error;
pub use request::{Destination, RequestDescriptor, RequestMode};
pub use response::CachedResponse;
