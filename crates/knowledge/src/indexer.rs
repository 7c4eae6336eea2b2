//! Offline index construction.

use crate::embeddings::EmbeddingProvider;
use crate::store::VectorStore;
use crate::types::{BuildStats, Chunk, EmbeddingFailurePolicy};
use futures::stream::{self, StreamExt};
use medrag_core::config::EmbeddingSettings;
use medrag_core::{AppError, AppResult};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Embeds chunks in ordered batches and assembles a `VectorStore`.
pub struct Indexer {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    concurrency: usize,
    policy: EmbeddingFailurePolicy,
    timeout: Duration,
}

impl Indexer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            batch_size: 32,
            concurrency: 1,
            policy: EmbeddingFailurePolicy::Abort,
            timeout: Duration::from_secs(60),
        }
    }

    /// Take batch size and concurrency from configuration.
    pub fn with_settings(self, settings: &EmbeddingSettings) -> Self {
        self.with_batch_size(settings.batch_size)
            .with_concurrency(settings.concurrency)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_policy(mut self, policy: EmbeddingFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Upper bound for each embedding batch call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Embed `chunks` and write the store to `dir`.
    ///
    /// Batches run concurrently but are consumed in input order, so the
    /// store order and the first reported failure never depend on timing.
    /// Nothing is written unless every kept batch embedded.
    ///
    /// # Errors
    /// `InvalidInput` for duplicate chunk ids; `Embedding` when a batch fails
    /// under the abort policy.
    pub async fn build(&self, chunks: Vec<Chunk>, dir: &Path) -> AppResult<(VectorStore, BuildStats)> {
        let start = Instant::now();
        check_unique_ids(&chunks)?;

        let identity = self.provider.identity();
        let chunks_in = chunks.len();
        let batches: Vec<Vec<Chunk>> = chunks
            .chunks(self.batch_size)
            .map(|batch| batch.to_vec())
            .collect();

        tracing::info!(
            chunks = chunks_in,
            batches = batches.len(),
            batch_size = self.batch_size,
            concurrency = self.concurrency,
            identity = %identity,
            "Building index"
        );

        let mut stats = BuildStats {
            chunks_in,
            batches: batches.len(),
            ..Default::default()
        };
        let mut entries = Vec::with_capacity(chunks_in);

        let mut results = stream::iter(batches.into_iter().enumerate())
            .map(|(n, batch)| async move {
                let outcome = self.embed_batch(&batch).await;
                (n, batch, outcome)
            })
            .buffered(self.concurrency);

        while let Some((n, batch, outcome)) = results.next().await {
            match outcome {
                Ok(vectors) => entries.extend(batch.into_iter().zip(vectors)),
                Err(e) => match self.policy {
                    EmbeddingFailurePolicy::Abort => {
                        tracing::error!(batch = n, error = %e, "Embedding batch failed, aborting build");
                        return Err(e);
                    }
                    EmbeddingFailurePolicy::Skip => {
                        stats.failed_batches += 1;
                        for chunk in &batch {
                            tracing::warn!(
                                batch = n,
                                chunk_id = %chunk.id(),
                                error = %e,
                                "Skipping chunk after embedding failure"
                            );
                            stats.skipped_chunk_ids.push(chunk.id().to_string());
                        }
                    }
                },
            }
        }

        stats.chunks_indexed = entries.len();
        if stats.chunks_indexed == 0 && chunks_in > 0 {
            tracing::warn!("Every embedding batch failed; the store is empty");
        }

        let store = VectorStore::create(dir, identity, entries).await?;
        stats.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            indexed = stats.chunks_indexed,
            skipped = stats.skipped_chunk_ids.len(),
            duration_ms = stats.duration_ms,
            "Index built"
        );
        Ok((store, stats))
    }

    async fn embed_batch(&self, batch: &[Chunk]) -> AppResult<Vec<Vec<f32>>> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

        let vectors = tokio::time::timeout(self.timeout, self.provider.embed_batch(&texts))
            .await
            .map_err(|_| {
                AppError::Embedding(format!(
                    "embedding batch timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            })??;

        if vectors.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "provider returned {} embeddings for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        let dims = self.provider.dimensions();
        if let Some((chunk, vector)) = batch.iter().zip(&vectors).find(|(_, v)| v.len() != dims) {
            return Err(AppError::Embedding(format!(
                "chunk {} embedded to {} dimensions, expected {}",
                chunk.id(),
                vector.len(),
                dims
            )));
        }

        Ok(vectors)
    }
}

fn check_unique_ids(chunks: &[Chunk]) -> AppResult<()> {
    let mut seen = HashSet::with_capacity(chunks.len());
    for chunk in chunks {
        if !seen.insert(chunk.id()) {
            return Err(AppError::InvalidInput(format!(
                "duplicate chunk_id '{}' in indexer input",
                chunk.id()
            )));
        }
    }
    Ok(())
}
