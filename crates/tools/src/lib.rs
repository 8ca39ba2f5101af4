//! Built-in tool implementations for Parley.
//!
//! Tools give the agent the ability to look things up while answering:
//! search Google and fetch web pages.

pub mod google_search;
pub mod url_fetch;

use std::sync::Arc;

use parley_config::ToolsConfig;
use parley_core::error::ToolError;
use parley_core::tool::{Tool, ToolRegistry};

pub use google_search::GoogleSearchTool;
pub use url_fetch::UrlFetchTool;

/// The built-in tools, in the order they are listed to the model.
pub fn default_tools(config: &ToolsConfig) -> Result<Vec<Arc<dyn Tool>>, ToolError> {
    Ok(vec![
        Arc::new(GoogleSearchTool::new(&config.google)?),
        Arc::new(UrlFetchTool::new(&config.url_fetch)?),
    ])
}

/// Create a registry holding every built-in tool.
pub fn default_registry(config: &ToolsConfig) -> Result<ToolRegistry, ToolError> {
    Ok(ToolRegistry::from_tools(default_tools(config)?))
}
