//! Provider construction from configuration.

use std::sync::Arc;
use std::time::Duration;
use toolrelay_config::AppConfig;
use toolrelay_core::error::Result;
use toolrelay_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the configured completion client.
///
/// Fails with `MissingCredential` before any client is constructed when no
/// API key is available. Ollama runs keyless.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>> {
    let api_key = if config.needs_api_key() {
        config.require_api_key()?
    } else {
        config.api_key.as_deref().unwrap_or("ollama")
    };

    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));

    tracing::debug!(provider = %config.provider, base_url = %base_url, "Building provider");

    let provider = OpenAiCompatProvider::new(
        &config.provider,
        base_url,
        api_key,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    Ok(Arc::new(provider))
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
