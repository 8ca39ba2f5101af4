//! Channel → agent registry.
//!
//! The one piece of process-wide mutable state. Agents are created lazily
//! on first contact with a channel and live for the rest of the process.
//! Each agent sits behind its own async mutex; holding that lock for a
//! whole turn is what serializes turns within a channel.

use std::collections::HashMap;
use std::sync::Arc;

use parley_core::channel::ChannelId;
use parley_core::provider::LanguageModel;
use parley_core::tool::ToolRegistry;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::agent::Agent;
use crate::prompt::DEFAULT_TEMPLATE;

/// Shared handle to one channel's agent.
pub type SharedAgent = Arc<Mutex<Agent>>;

/// Creates and tracks one [`Agent`] per channel.
#[derive(Clone)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<ChannelId, SharedAgent>>>,
    model: Arc<dyn LanguageModel>,
    tools: Arc<ToolRegistry>,
    window_size: usize,
    template: Arc<str>,
}

impl AgentRegistry {
    pub fn new(model: Arc<dyn LanguageModel>, tools: Arc<ToolRegistry>, window_size: usize) -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
            model,
            tools,
            window_size,
            template: Arc::from(DEFAULT_TEMPLATE),
        }
    }

    /// Use a custom system prompt template for agents created from now on.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Arc::from(template.into());
        self
    }

    /// The agent for `channel_id`, creating it on first use.
    ///
    /// Concurrent callers for the same new channel all get the same agent.
    pub async fn get_or_create(&self, channel_id: &ChannelId) -> SharedAgent {
        if let Some(agent) = self.agents.read().await.get(channel_id) {
            return agent.clone();
        }

        let mut agents = self.agents.write().await;
        agents
            .entry(channel_id.clone())
            .or_insert_with(|| {
                info!(channel_id = %channel_id, "Creating agent for new channel");
                Arc::new(Mutex::new(Agent::with_template(
                    channel_id.clone(),
                    self.model.clone(),
                    self.tools.clone(),
                    self.window_size,
                    &self.template,
                )))
            })
            .clone()
    }

    /// The agent for `channel_id`, if one exists.
    pub async fn get(&self, channel_id: &ChannelId) -> Option<SharedAgent> {
        self.agents.read().await.get(channel_id).cloned()
    }

    /// Number of channels with an agent.
    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}
