//! agent_message tool implementation.
//!
//! Posts a control message (e.g. `{"type": "SKIP_WAITING"}`) to the agent.

use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::Agent;
use shelter_core::Error;

/// Input parameters for agent_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentMessageParams {
    /// Message object; `{"type": "SKIP_WAITING"}` activates a waiting agent.
    pub message: serde_json::Value,
}

/// Output structure for agent_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentMessageOutput {
    /// Lifecycle state after the message was handled.
    pub state: String,
    /// Buckets the agent keeps on activation.
    pub whitelist: Vec<String>,
}

/// Implementation of the agent_message tool.
pub async fn message_impl(agent: &Agent, params: AgentMessageParams) -> Result<CallToolResult, McpError> {
    if params.message.is_null() {
        return Err(Error::InvalidInput("message cannot be null".into()).into());
    }

    let state = agent.handle_message(&params.message).await?;
    let output = AgentMessageOutput { state: state.to_string(), whitelist: agent.whitelist() };

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&output).unwrap_or_default(),
    )]))
}
