//! cache_buckets tool implementation.
//!
//! Lists the buckets in the cache store with their entry counts.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::Agent;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BucketSummary {
    pub name: String,
    pub entries: usize,
    /// Whether activation keeps this bucket.
    pub current: bool,
    /// Newest entry's URL.
    pub newest_url: Option<String>,
}

/// Output from the cache_buckets tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheBucketsOutput {
    /// Agent lifecycle state.
    pub state: String,
    pub buckets: Vec<BucketSummary>,
}

/// Implementation of the cache_buckets tool.
pub async fn list_impl(agent: &Agent) -> Result<CallToolResult, McpError> {
    let store = agent.store();
    let whitelist = agent.whitelist();

    let mut buckets = Vec::new();
    for name in store.list_buckets().await? {
        let entries = store.entries(&name).await?;
        buckets.push(BucketSummary {
            current: whitelist.contains(&name),
            entries: entries.len(),
            newest_url: entries.last().map(|meta| meta.url.clone()),
            name,
        });
    }

    let output = CacheBucketsOutput { state: agent.state().await.to_string(), buckets };
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&output).unwrap_or_default(),
    )]))
}
