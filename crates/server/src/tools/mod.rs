//! MCP tool implementations.
//!
//! This module contains all tools exposed by the shelter server.

pub mod agent_fetch;
pub mod agent_message;
pub mod cache;

pub use agent_fetch::{AgentFetchParams, fetch_impl};
pub use agent_message::{AgentMessageParams, message_impl};

#[cfg(test)]
pub(crate) mod test_support;
