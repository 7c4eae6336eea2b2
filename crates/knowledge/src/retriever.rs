//! Query-time retrieval over a loaded store.

use crate::embeddings::EmbeddingProvider;
use crate::store::VectorStore;
use crate::types::RetrievalResult;
use medrag_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Embeds queries and ranks store rows by cosine similarity.
#[derive(Debug, Clone)]
pub struct Retriever {
    store: Arc<VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl Retriever {
    /// # Errors
    /// `StoreLoad` when the provider's dimension differs from the store's.
    pub fn new(store: Arc<VectorStore>, provider: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        if provider.dimensions() != store.dimensions() {
            return Err(AppError::StoreLoad(format!(
                "embedding provider {} produces {} dimensions but the store holds {}",
                provider.provider_name(),
                provider.dimensions(),
                store.dimensions()
            )));
        }

        Ok(Self {
            store,
            provider,
            timeout: Duration::from_secs(60),
        })
    }

    /// Upper bound for the query embedding call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// Top-`k` chunks for `query`, best first.
    #[tracing::instrument(skip(self, query), fields(rows = self.store.len()))]
    pub async fn retrieve(&self, query: &str, k: usize) -> AppResult<RetrievalResult> {
        if k == 0 {
            return Err(AppError::InvalidInput("k must be at least 1".to_string()));
        }

        let embedding = tokio::time::timeout(self.timeout, self.provider.embed(query))
            .await
            .map_err(|_| {
                AppError::Embedding(format!(
                    "query embedding timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            })??;

        if embedding.len() != self.store.dimensions() {
            return Err(AppError::Embedding(format!(
                "query embedding has {} dimensions, store has {}",
                embedding.len(),
                self.store.dimensions()
            )));
        }

        let hits = self.store.search(&embedding, k).await?;
        tracing::debug!(
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "Retrieved chunks"
        );
        Ok(RetrievalResult { hits })
    }
}
