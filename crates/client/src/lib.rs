//! Client code for shelter.
//!
//! This crate provides the caching agent: network fetcher, route table,
//! cache strategies and their plugins, precaching, lifecycle control, and the
//! offline navigation fallback.

pub mod agent;
pub mod fetch;
pub mod lifecycle;
pub mod navigation;
pub mod plugins;
pub mod precache;
pub mod routing;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use agent::Agent;
pub use fetch::{FetchClient, FetchConfig, Fetcher};
pub use lifecycle::{AgentMessage, LifecycleState};
pub use plugins::{BroadcastUpdate, CacheUpdate, CacheableResponse, Expiration, PluginChain};
pub use precache::{InstallReport, Precache};
pub use routing::{Route, RoutePredicate, Router};
pub use strategy::{AgentContext, CacheFirst, Handled, ResponseSource, StaleWhileRevalidate, Strategy};
