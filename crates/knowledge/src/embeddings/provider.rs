//! Embedding provider trait and factory.

use crate::embeddings::providers::{GeminiEmbeddingProvider, OllamaProvider, TrigramProvider};
use crate::types::StoreIdentity;
use medrag_core::config::{resolve_api_key, EmbeddingSettings};
use medrag_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "gemini", "ollama", "trigram")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch, in input order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }

    /// Identity recorded in, and checked against, persisted stores.
    fn identity(&self) -> StoreIdentity {
        StoreIdentity {
            provider: self.provider_name().to_string(),
            model: self.model_name().to_string(),
            dimensions: self.dimensions(),
        }
    }
}

/// Create an embedding provider based on configuration.
pub fn create_provider(
    settings: &EmbeddingSettings,
    timeout: Duration,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "trigram" => Ok(Arc::new(TrigramProvider::with_model(
            settings.model.clone(),
            settings.dimensions,
        ))),

        "ollama" => {
            let base_url = settings
                .endpoint
                .clone()
                .unwrap_or_else(|| crate::embeddings::providers::ollama::DEFAULT_OLLAMA_URL.to_string());
            Ok(Arc::new(OllamaProvider::new(
                base_url,
                settings.model.clone(),
                settings.dimensions,
                timeout,
            )?))
        }

        "gemini" => {
            let api_key = resolve_api_key(settings.api_key_env.as_deref()).ok_or_else(|| {
                AppError::Config(format!(
                    "Gemini embeddings require an API key in ${}",
                    settings.api_key_env.as_deref().unwrap_or("GEMINI_API_KEY")
                ))
            })?;
            let base_url = settings.endpoint.clone().unwrap_or_else(|| {
                crate::embeddings::providers::gemini::DEFAULT_GEMINI_URL.to_string()
            });
            Ok(Arc::new(GeminiEmbeddingProvider::new(
                base_url,
                api_key,
                settings.model.clone(),
                settings.dimensions,
                timeout,
            )?))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: gemini, ollama, trigram",
            settings.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str) -> EmbeddingSettings {
        EmbeddingSettings {
            provider: provider.to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            api_key_env: None,
            ..EmbeddingSettings::default()
        }
    }

    #[test]
    fn test_create_trigram_provider() {
        let provider = create_provider(&settings("trigram"), Duration::from_secs(5)).unwrap();
        assert_eq!(
            provider.identity(),
            StoreIdentity {
                provider: "trigram".to_string(),
                model: "trigram-v1".to_string(),
                dimensions: 384,
            }
        );
    }

    #[test]
    fn test_create_unknown_provider() {
        let result = create_provider(&settings("unknown"), Duration::from_secs(5));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Unknown embedding provider"));
    }

    #[test]
    fn test_gemini_without_key_fails() {
        let result = create_provider(&settings("gemini"), Duration::from_secs(5));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_provider_embed_single() {
        let provider = create_provider(&settings("trigram"), Duration::from_secs(5)).unwrap();
        let embedding = provider.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }
}
