//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Per-channel conversation memory
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Agent turn settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Discord bot settings
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// ── Model ──

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backend: "gemini" or "openai" (any OpenAI-compatible endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name passed to the backend
    #[serde(default = "default_model")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override; each provider has its own default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.0-flash-exp".into()
}
fn default_temperature() -> f32 {
    1.0
}
fn default_max_tokens() -> u32 {
    8192
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_model(),
            api_key: None,
            api_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

// ── Memory / agent ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Messages kept per channel; older ones are evicted first
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_window_size() -> usize {
    20
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Deadline for one full turn, tool call and follow-up included
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,
}

fn default_turn_timeout() -> u64 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: default_turn_timeout(),
        }
    }
}

// ── Discord ──

#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Discord rejects messages longer than this
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,

    /// Pause between consecutive chunks of one reply
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,

    /// Only answer messages that mention the bot
    #[serde(default = "default_true")]
    pub require_mention: bool,

    /// Image MIME types forwarded to the model
    #[serde(default = "default_image_types")]
    pub supported_image_types: Vec<String>,
}

fn default_max_message_len() -> usize {
    2000
}
fn default_chunk_delay_ms() -> u64 {
    500
}
fn default_image_types() -> Vec<String> {
    ["image/png", "image/jpeg", "image/webp", "image/gif"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            max_message_len: default_max_message_len(),
            chunk_delay_ms: default_chunk_delay_ms(),
            require_mention: true,
            supported_image_types: default_image_types(),
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("max_message_len", &self.max_message_len)
            .field("chunk_delay_ms", &self.chunk_delay_ms)
            .field("require_mention", &self.require_mention)
            .field("supported_image_types", &self.supported_image_types)
            .finish()
    }
}

// ── Tools ──

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub google: GoogleSearchConfig,

    #[serde(default)]
    pub url_fetch: UrlFetchConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct GoogleSearchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Programmable Search Engine id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cse_id: Option<String>,
}

impl GoogleSearchConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.cse_id.is_some()
    }
}

impl std::fmt::Debug for GoogleSearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("cse_id", &self.cse_id)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlFetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Characters of page content kept before truncating
    #[serde(default = "default_fetch_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_fetch_timeout() -> u64 {
    30
}
fn default_fetch_max_chars() -> usize {
    1000
}
fn default_user_agent() -> String {
    concat!("parley/", env!("CARGO_PKG_VERSION")).into()
}

impl Default for UrlFetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_chars: default_fetch_max_chars(),
            user_agent: default_user_agent(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.parley/config.toml).
    ///
    /// Environment variables fill in secrets the file leaves unset:
    /// - `GEMINI_API_KEY` / `PARLEY_API_KEY` for the model
    /// - `DISCORD_BOT_TOKEN`
    /// - `GOOGLE_API_KEY` / `GOOGLE_CSE_ID`
    ///
    /// `PARLEY_PROVIDER` and `PARLEY_MODEL` override the file outright.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = env("PARLEY_PROVIDER") {
            self.model.provider = provider;
        }
        if let Some(model) = env("PARLEY_MODEL") {
            self.model.name = model;
        }
        if self.model.api_key.is_none() {
            self.model.api_key = env("PARLEY_API_KEY").or_else(|| env("GEMINI_API_KEY"));
        }
        if self.discord.bot_token.is_none() {
            self.discord.bot_token = env("DISCORD_BOT_TOKEN");
        }
        if self.tools.google.api_key.is_none() {
            self.tools.google.api_key = env("GOOGLE_API_KEY");
        }
        if self.tools.google.cse_id.is_none() {
            self.tools.google.cse_id = env("GOOGLE_CSE_ID");
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.memory.window_size == 0 {
            return Err(ConfigError::ValidationError(
                "memory.window_size must be > 0".into(),
            ));
        }

        if self.discord.max_message_len == 0 {
            return Err(ConfigError::ValidationError(
                "discord.max_message_len must be > 0".into(),
            ));
        }

        if self.agent.turn_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.turn_timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if a model API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// The Discord token, or an error naming where to put it.
    pub fn require_bot_token(&self) -> Result<&str, ConfigError> {
        self.discord
            .bot_token
            .as_deref()
            .ok_or(ConfigError::MissingSecret {
                key: "discord.bot_token",
                env: "DISCORD_BOT_TOKEN",
            })
    }

    /// A copy with every secret replaced by a placeholder, for display.
    pub fn redacted(&self) -> Self {
        let mask = |secret: &Option<String>| secret.as_ref().map(|_| "[REDACTED]".to_string());
        let mut config = self.clone();
        config.model.api_key = mask(&self.model.api_key);
        config.discord.bot_token = mask(&self.discord.bot_token);
        config.tools.google.api_key = mask(&self.tools.google.api_key);
        config.tools.google.cse_id = mask(&self.tools.google.cse_id);
        config
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing {key}: set it in config.toml or export {env}")]
    MissingSecret {
        key: &'static str,
        env: &'static str,
    },
}
