//! Medical transcription knowledge base.
//!
//! Offline: corpus -> `Chunker` -> chunk file -> `Indexer` -> persisted store.
//! Online: `Retriever` -> prompt assembly -> generation, driven by
//! `RagOrchestrator` and cached in a `PipelineRegistry`.

pub mod chunker;
pub mod corpus;
pub mod embeddings;
pub mod indexer;
pub mod rag;
pub mod retriever;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use chunker::Chunker;
pub use corpus::{load_corpus, read_chunks, write_chunks, Corpus};
pub use embeddings::{create_provider, EmbeddingProvider};
pub use indexer::Indexer;
pub use rag::{AnswerResult, AskOptions, PipelineRegistry, PipelineStage, RagOrchestrator};
pub use retriever::Retriever;
pub use store::{store_stats, VectorStore};
pub use types::{
    BuildStats, Chunk, ChunkMetadata, ChunkSpan, Document, DocumentMetadata,
    EmbeddingFailurePolicy, RetrievalResult, ScoredChunk, StoreIdentity, StoreStats,
};

use medrag_core::config::EmbeddingSettings;
use medrag_core::AppResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Outcome of `preprocess`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreprocessStats {
    pub documents: usize,
    pub dropped_rows: usize,
    pub chunks: usize,
}

/// Chunk a corpus file and write the chunk interchange file.
pub fn preprocess(corpus_path: &Path, output: &Path, chunker: &Chunker) -> AppResult<PreprocessStats> {
    let corpus = load_corpus(corpus_path)?;
    let chunks = chunker.split_all(corpus.iter());
    write_chunks(output, &chunks)?;

    Ok(PreprocessStats {
        documents: corpus.documents.len(),
        dropped_rows: corpus.dropped_rows,
        chunks: chunks.len(),
    })
}

/// Embed a chunk file and persist the resulting store to `store_dir`.
pub async fn index(
    chunks_path: &Path,
    store_dir: &Path,
    settings: &EmbeddingSettings,
    policy: EmbeddingFailurePolicy,
    timeout: Duration,
) -> AppResult<BuildStats> {
    let chunks = read_chunks(chunks_path)?;
    let provider = create_provider(settings, timeout)?;

    Indexer::new(provider)
        .with_settings(settings)
        .with_policy(policy)
        .with_timeout(timeout)
        .build(chunks, store_dir)
        .await
        .map(|(_, stats)| stats)
}
