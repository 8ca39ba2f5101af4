//! Builds the configured model client.
//!
//! The whole process shares one client; agents hold it behind an `Arc`.

use std::sync::Arc;

use parley_config::AppConfig;
use parley_core::error::ProviderError;
use parley_core::provider::LanguageModel;

use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
///
/// Fails when the API key is missing or the provider name is unknown.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn LanguageModel>, ProviderError> {
    let model = &config.model;
    let api_key = model.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(format!(
            "No API key for provider '{}' (set GEMINI_API_KEY or model.api_key)",
            model.provider
        ))
    })?;

    let provider: Arc<dyn LanguageModel> = match model.provider.as_str() {
        "gemini" | "google" => {
            let mut p = GeminiProvider::new(api_key, &model.name)?
                .with_generation(model.temperature, model.max_tokens);
            if let Some(url) = &model.api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        name @ ("openai" | "openrouter" | "ollama" | "custom") => {
            let base_url = model
                .api_url
                .clone()
                .unwrap_or_else(|| default_base_url(name));
            Arc::new(
                OpenAiCompatProvider::new(name, base_url, api_key, &model.name)?
                    .with_generation(model.temperature, model.max_tokens),
            )
        }
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "Unknown provider '{other}' (expected gemini, openai, openrouter, ollama, or custom)"
            )));
        }
    };

    Ok(provider)
}

/// Get the default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        _ => "https://api.openai.com/v1",
    }
    .into()
}
