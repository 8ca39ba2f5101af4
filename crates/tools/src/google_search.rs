//! Google search tool: Google Custom Search JSON API.
//!
//! Returns the result snippets, one per line. Missing input or credentials
//! produce an explanatory observation rather than an error, so the model
//! can tell the user what went wrong.

use async_trait::async_trait;
use parley_config::GoogleSearchConfig;
use parley_core::error::ToolError;
use parley_core::tool::Tool;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

pub struct GoogleSearchTool {
    api_key: Option<String>,
    cse_id: Option<String>,
    endpoint: String,
    client: reqwest::Client,
}

impl GoogleSearchTool {
    pub fn new(config: &GoogleSearchConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ToolError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            cse_id: config.cse_id.clone().filter(|c| !c.is_empty()),
            endpoint: DEFAULT_ENDPOINT.into(),
            client,
        })
    }

    /// Override the search endpoint (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl Tool for GoogleSearchTool {
    fn name(&self) -> &str {
        "google_search"
    }

    fn description(&self) -> &str {
        "Searches Google for the given query."
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let query = input.trim();
        if query.is_empty() {
            return Ok("Error: No query provided".into());
        }

        let (Some(api_key), Some(cse_id)) = (&self.api_key, &self.cse_id) else {
            return Ok("Error: Google API key or CSE ID not configured".into());
        };

        debug!(query, "Running Google search");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("key", api_key.as_str()), ("cx", cse_id.as_str()), ("q", query)])
            .send()
            .await
            .map_err(|e| self.failed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.failed(format!("HTTP {}", status.as_u16())));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| self.failed(format!("invalid response: {e}")))?;

        let snippets: Vec<&str> = body
            .items
            .iter()
            .map(|item| item.snippet.as_str())
            .filter(|s| !s.is_empty())
            .collect();

        if snippets.is_empty() {
            return Ok("No results found".into());
        }

        Ok(snippets.join("\n"))
    }
}
