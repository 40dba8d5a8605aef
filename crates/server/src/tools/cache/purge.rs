//! cache_purge tool implementation.
//!
//! Deletes a whole bucket, or a single entry by URL.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::Agent;
use shelter_core::{Error, RequestDescriptor};

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Bucket to purge.
    pub bucket: String,

    /// Delete only the entry for this URL (GET); the whole bucket otherwise.
    pub url: Option<String>,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of buckets or entries deleted.
    pub deleted: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(agent: &Agent, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if params.bucket.trim().is_empty() {
        return Err(Error::InvalidInput("bucket must be specified".to_string()).into());
    }

    let store = agent.store();
    let deleted = match params.url {
        Some(url) => {
            let key = RequestDescriptor::get(&url)?.cache_key();
            store.delete(&params.bucket, &key).await?
        }
        None => store.delete_bucket(&params.bucket).await?,
    };

    tracing::info!(bucket = %params.bucket, deleted, "cache purge");

    let output = CachePurgeOutput { deleted: u64::from(deleted) };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
