//! Language-model provider implementations for Maestro.
//!
//! All providers implement the `maestro_core::Provider` trait. Which
//! concrete model backs which logical role (primary reply vs. advisor
//! side-calls) is decided by [`build_provider`] from configuration.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use maestro_config::ModelConfig;
use maestro_core::Provider;
use std::sync::Arc;

/// Build a provider for one model role.
///
/// `api_key` is ignored by endpoints that do not need one (Ollama).
pub fn build_provider(model: &ModelConfig, api_key: Option<&str>) -> Arc<dyn Provider> {
    let base_url = model
        .base_url
        .clone()
        .unwrap_or_else(|| default_base_url(&model.provider));

    let provider = match model.provider.as_str() {
        "ollama" => OpenAiCompatProvider::new("ollama", &base_url, "ollama"),
        name => OpenAiCompatProvider::new(name, &base_url, api_key.unwrap_or_default()),
    };
    Arc::new(provider)
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
