//! agent_fetch tool implementation.
//!
//! Routes a request through the caching agent exactly as the hosting page's
//! fetch would be routed.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::*};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::{Agent, ResponseSource};
use shelter_core::{Destination, Error, RequestDescriptor};

/// Input parameters for agent_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentFetchParams {
    /// Absolute URL to request.
    pub url: String,

    /// HTTP method (default: GET). Only GET requests are cached.
    #[serde(default = "default_method")]
    pub method: String,

    /// Request destination: document, image, font, script, style, manifest,
    /// other, or empty (default).
    #[serde(default)]
    pub destination: Destination,

    /// Treat the request as a top-level navigation.
    #[serde(default)]
    pub navigate: bool,

    /// Wait for background revalidation to finish before returning.
    #[serde(default)]
    pub wait_for_revalidation: bool,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for agent_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentFetchOutput {
    /// Requested URL after canonicalization.
    pub url: String,
    /// URL the response was served from.
    pub response_url: String,
    /// HTTP status; 0 for opaque responses.
    pub status: u16,
    /// precache, cache, network, shell-fallback, or passthrough.
    pub source: String,
    /// Bucket the response was read from, if any.
    pub bucket: Option<String>,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    pub body_bytes: usize,
    /// Whether a background refresh was still running when the response
    /// was returned.
    pub revalidating: bool,
}

/// Implementation of the agent_fetch tool.
pub async fn fetch_impl(agent: &Agent, params: AgentFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let mut request = if params.navigate {
        RequestDescriptor::navigation(&params.url)?
    } else {
        RequestDescriptor::get(&params.url)?.with_destination(params.destination)
    };
    request.method = params.method.trim().to_ascii_uppercase();

    let mut handled = agent.handle_fetch(&request).await?;
    if params.wait_for_revalidation {
        handled.settled().await;
    }

    let response = &handled.response;
    let output = AgentFetchOutput {
        url: request.url.to_string(),
        response_url: response.url.clone(),
        status: response.status,
        source: handled.source.label().to_string(),
        bucket: match &handled.source {
            ResponseSource::Cache { bucket } => Some(bucket.clone()),
            ResponseSource::Precache | ResponseSource::ShellFallback => Some(agent.precache().bucket().to_string()),
            _ => None,
        },
        content_type: response.content_type().map(str::to_string),
        headers: response.headers.clone(),
        body: response.text(),
        body_bytes: response.body.len(),
        revalidating: handled.has_pending(),
    };

    tracing::debug!(url = %output.url, source = %output.source, status = output.status, "agent_fetch served");

    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&output).unwrap_or_default(),
    )]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{active_agent, output_json};

    fn params(url: &str) -> AgentFetchParams {
        AgentFetchParams {
            url: url.into(),
            method: default_method(),
            destination: Destination::Empty,
            navigate: false,
            wait_for_revalidation: false,
        }
    }

    #[tokio::test]
    async fn test_fetch_empty_url() {
        let (agent, _fetcher) = active_agent().await;
        assert!(fetch_impl(&agent, params("  ")).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_precached_shell() {
        let (agent, fetcher) = active_agent().await;
        fetcher.set_offline(true);

        let result = fetch_impl(&agent, params("https://app.example.com/index.html")).await.unwrap();
        let output: AgentFetchOutput = output_json(&result);
        assert_eq!(output.source, "precache");
        assert_eq!(output.bucket.as_deref(), Some("app-shell-precache-v1"));
        assert_eq!(output.status, 200);
    }

    #[tokio::test]
    async fn test_fetch_offline_navigation() {
        let (agent, fetcher) = active_agent().await;
        fetcher.set_offline(true);

        let mut p = params("https://app.example.com/timetable");
        p.navigate = true;
        let output: AgentFetchOutput = output_json(&fetch_impl(&agent, p).await.unwrap());
        assert_eq!(output.source, "shell-fallback");
        assert_eq!(output.body, "index.html");
    }

    #[tokio::test]
    async fn test_fetch_image_then_cache() {
        let (agent, fetcher) = active_agent().await;
        fetcher.respond("https://app.example.com/images/bg.png", 200, "png");

        let mut p = params("https://app.example.com/images/bg.png");
        p.destination = Destination::Image;
        let first: AgentFetchOutput = output_json(&fetch_impl(&agent, p.clone()).await.unwrap());
        assert_eq!(first.source, "network");

        let second: AgentFetchOutput = output_json(&fetch_impl(&agent, p).await.unwrap());
        assert_eq!(second.source, "cache");
        assert_eq!(second.bucket.as_deref(), Some("static-assets-v2"));
    }

    #[tokio::test]
    async fn test_fetch_uncacheable_image_is_error() {
        let (agent, fetcher) = active_agent().await;
        fetcher.respond("https://app.example.com/images/missing.png", 404, "");

        let mut p = params("https://app.example.com/images/missing.png");
        p.destination = Destination::Image;
        assert!(fetch_impl(&agent, p).await.is_err());
    }
}
