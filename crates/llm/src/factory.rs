//! Generation client factory.
//!
//! Resolves the configured provider, its endpoint and API key, and builds
//! the matching client.

use std::sync::Arc;
use std::time::Duration;

use crate::client::LlmClient;
use crate::providers::gemini::DEFAULT_GEMINI_URL;
use crate::providers::ollama::DEFAULT_OLLAMA_URL;
use crate::providers::{GeminiClient, OllamaClient};
use crate::types::ProviderType;
use medrag_core::config::{resolve_api_key, GenerationSettings};
use medrag_core::{AppError, AppResult};

/// Create a generation client from configuration.
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or a required API
/// key is missing from the environment.
pub fn create_client(
    settings: &GenerationSettings,
    timeout: Duration,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider = ProviderType::parse(&settings.provider).ok_or_else(|| {
        AppError::Config(format!("Unknown generation provider: {}", settings.provider))
    })?;

    match provider {
        ProviderType::Ollama => {
            let base_url = settings.endpoint.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            Ok(Arc::new(OllamaClient::new(base_url, timeout)?))
        }
        ProviderType::Gemini => {
            let api_key = resolve_api_key(settings.api_key_env.as_deref()).ok_or_else(|| {
                AppError::Config(format!(
                    "Gemini provider requires an API key in ${}",
                    settings.api_key_env.as_deref().unwrap_or("GEMINI_API_KEY")
                ))
            })?;
            let base_url = settings.endpoint.as_deref().unwrap_or(DEFAULT_GEMINI_URL);
            Ok(Arc::new(GeminiClient::new(base_url, api_key, timeout)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str) -> GenerationSettings {
        GenerationSettings {
            provider: provider.to_string(),
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key_env: None,
        }
    }

    #[test]
    fn test_create_ollama_client() {
        let client = create_client(&settings("ollama"), Duration::from_secs(5)).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let mut gemini = settings("gemini");
        gemini.api_key_env = Some("MEDRAG_TEST_KEY_THAT_IS_NEVER_SET".to_string());
        match create_client(&gemini, Duration::from_secs(5)) {
            Err(AppError::Config(msg)) => assert!(msg.contains("MEDRAG_TEST_KEY_THAT_IS_NEVER_SET")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("Expected error for Gemini without API key"),
        }
    }

    #[test]
    fn test_unknown_provider() {
        match create_client(&settings("unknown"), Duration::from_secs(5)) {
            Err(err) => assert!(err.to_string().contains("Unknown generation provider")),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
