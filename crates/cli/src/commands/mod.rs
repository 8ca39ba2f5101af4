//! Subcommand implementations and the wiring they share.

pub mod ask;
pub mod chat;
pub mod config_cmd;
pub mod discord;
pub mod doctor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parley_agent::AgentRegistry;
use parley_channels::AttachmentResolver;
use parley_config::AppConfig;
use parley_core::channel::Channel;
use parley_core::provider::LanguageModel;
use parley_core::tool::ToolRegistry;
use parley_gateway::{Gateway, GatewaySettings};
use tracing::info;

pub fn default_config_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

/// Load the config file (if any) and apply environment overrides.
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    AppConfig::load_with_env(path).with_context(|| format!("loading {}", path.display()))
}

/// The configured model client. Fails early when no API key is set.
pub fn build_model(config: &AppConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    if !config.has_api_key() {
        anyhow::bail!(
            "no model API key configured: set GEMINI_API_KEY (or PARLEY_API_KEY), \
             or add model.api_key to {}",
            default_config_path().display()
        );
    }
    let model = parley_providers::build_from_config(config)
        .with_context(|| format!("provider '{}' could not be built", config.model.provider))?;
    Ok(model)
}

pub fn build_tools(config: &AppConfig) -> anyhow::Result<Arc<ToolRegistry>> {
    let tools = parley_tools::default_registry(&config.tools)?;
    info!(tools = ?tools.names(), "Tools registered");
    Ok(Arc::new(tools))
}

/// Model, tools, and agent registry, wired to `channel`.
pub fn build_gateway(config: &AppConfig, channel: Arc<dyn Channel>) -> anyhow::Result<Gateway> {
    let model = build_model(config)?;
    let tools = build_tools(config)?;
    info!(provider = model.name(), model = %config.model.name, "Language model ready");

    let agents = AgentRegistry::new(model, tools, config.memory.window_size);
    Ok(Gateway::new(
        channel,
        agents,
        AttachmentResolver::from_config(&config.discord),
        GatewaySettings::from_config(config),
    ))
}
