//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::{
    AgentFetchParams, AgentMessageParams,
    cache::{CachePurgeParams, list_impl, purge_impl},
    fetch_impl, message_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use shelter_client::Agent;

/// The main MCP server handler for shelter.
#[derive(Clone)]
pub struct ShelterServer {
    agent: Arc<Agent>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ShelterServer {
    /// Create a new server handler around an installed agent.
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent, tool_router: Self::tool_router() }
    }

    /// Route a request through the caching agent.
    #[tool(
        description = "Fetch a URL through the offline caching agent. Returns the response and whether it came from the precache, a cache bucket, the network, or the offline shell."
    )]
    async fn agent_fetch(&self, params: Parameters<AgentFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.agent, params.0).await
    }

    /// Post a lifecycle control message.
    #[tool(description = "Send a control message to the agent. {\"type\": \"SKIP_WAITING\"} activates a waiting agent.")]
    async fn agent_message(&self, params: Parameters<AgentMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.agent, params.0).await
    }

    #[tool(description = "List cache buckets with entry counts and whether activation keeps them.")]
    async fn cache_buckets(&self) -> Result<CallToolResult, McpError> {
        list_impl(&self.agent).await
    }

    #[tool(description = "Delete a cache bucket, or a single entry of it by URL.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.agent, params.0).await
    }
}

impl ServerHandler for ShelterServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "shelter".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::active_agent;

    #[tokio::test]
    async fn test_tools_registered() {
        let (agent, _fetcher) = active_agent().await;
        let server = ShelterServer::new(agent);

        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["agent_fetch", "agent_message", "cache_buckets", "cache_purge"]);
    }
}
