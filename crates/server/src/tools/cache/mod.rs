//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting and purging the agent's buckets.

pub mod list;
pub mod purge;

pub use list::list_impl;
pub use purge::{CachePurgeParams, purge_impl};
