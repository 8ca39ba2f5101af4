//! Tool trait: the abstraction over agent capabilities.
//!
//! A tool takes one free-form input string chosen by the model and returns
//! an observation string. Tools are looked up by exact name, so names must
//! be single words (`[A-Za-z0-9_]+`) for the directive parser to find them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::ToolError;

/// The core Tool trait.
///
/// Each tool (google_search, url_fetch, ...) implements this trait and is
/// registered in a [`ToolRegistry`] shared by every agent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "google_search").
    fn name(&self) -> &str;

    /// A one-line description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Run the tool on a raw input string.
    async fn invoke(&self, input: &str) -> std::result::Result<String, ToolError>;
}

/// Whether `name` can be matched by the directive parser.
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A registry of available tools.
///
/// Registration order is remembered so prompts list tools deterministically.
/// Registering a second tool under an existing name replaces the first one
/// in place (last registration wins).
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of tools, in order.
    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    /// Register a tool. Returns `false` if the name is not a single word
    /// and the tool was skipped.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        let name = tool.name().to_string();
        if !is_valid_tool_name(&name) {
            warn!(tool = %name, "Skipping tool with a name the directive parser cannot match");
            return false;
        }
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Duplicate tool name, replacing earlier registration");
        } else {
            self.order.push(name);
        }
        true
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Look up and run a tool.
    pub async fn invoke(&self, name: &str, input: &str) -> std::result::Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.invoke(input).await
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// `(name, description)` pairs, in registration order.
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        self.order
            .iter()
            .filter_map(|name| {
                self.tools
                    .get(name)
                    .map(|tool| (name.as_str(), tool.description()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}
