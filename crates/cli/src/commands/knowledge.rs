//! Knowledge base commands: preprocess, index and stats.

use crate::commands::print_json;
use clap::Args;
use medrag_core::{config::AppConfig, AppResult};
use medrag_knowledge::{store_stats, Chunker, EmbeddingFailurePolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Chunk a transcription corpus
#[derive(Args, Debug)]
pub struct PreprocessCommand {
    /// Corpus file (JSON array or JSON Lines)
    #[arg(long)]
    pub corpus: PathBuf,

    /// Chunk file to write (.jsonl for JSON Lines)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Maximum characters per chunk (default from config)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Characters shared by adjacent chunks (default from config)
    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl PreprocessCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let chunking = &config.pipeline.chunking;
        let chunker = Chunker::new(
            self.chunk_size.unwrap_or(chunking.chunk_size),
            self.chunk_overlap.unwrap_or(chunking.chunk_overlap),
        )?;
        tracing::info!(
            corpus = %self.corpus.display(),
            chunk_size = chunker.chunk_size(),
            chunk_overlap = chunker.chunk_overlap(),
            "Executing preprocess command"
        );

        let stats = medrag_knowledge::preprocess(&self.corpus, &self.output, &chunker)?;

        if self.json {
            print_json(&stats)?;
        } else {
            println!(
                "Wrote {} chunks from {} documents to {} ({} rows dropped)",
                stats.chunks,
                stats.documents,
                self.output.display(),
                stats.dropped_rows
            );
        }

        Ok(())
    }
}

/// Embed chunks and persist the store
#[derive(Args, Debug)]
pub struct IndexCommand {
    /// Chunk file produced by `preprocess`
    #[arg(long)]
    pub chunks: PathBuf,

    /// Store directory (default from config)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// What to do when an embedding batch fails (abort, skip)
    #[arg(long, default_value = "abort", value_parser = parse_policy)]
    pub on_embedding_error: EmbeddingFailurePolicy,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_policy(value: &str) -> Result<EmbeddingFailurePolicy, String> {
    EmbeddingFailurePolicy::parse(value)
        .ok_or_else(|| format!("expected 'abort' or 'skip', got '{}'", value))
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let pipeline = config.resolved_pipeline();
        pipeline.validate()?;
        let store_dir = self
            .store
            .as_ref()
            .map(|dir| config.workspace.join(dir))
            .unwrap_or_else(|| pipeline.store_dir.clone());

        tracing::info!(
            chunks = %self.chunks.display(),
            store = %store_dir.display(),
            policy = ?self.on_embedding_error,
            "Executing index command"
        );

        let stats = medrag_knowledge::index(
            &self.chunks,
            &store_dir,
            &pipeline.embedding,
            self.on_embedding_error,
            Duration::from_secs(pipeline.request_timeout_secs),
        )
        .await?;

        if self.json {
            print_json(&stats)?;
        } else {
            println!(
                "Indexed {} of {} chunks into {} in {:.2}s",
                stats.chunks_indexed,
                stats.chunks_in,
                store_dir.display(),
                stats.duration_ms as f64 / 1000.0
            );
            if !stats.skipped_chunk_ids.is_empty() {
                println!(
                    "Skipped {} chunks after embedding failures: {}",
                    stats.skipped_chunk_ids.len(),
                    stats.skipped_chunk_ids.join(", ")
                );
            }
        }

        Ok(())
    }
}

/// Show vector store statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Store directory (default from config)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let store_dir = self
            .store
            .as_ref()
            .map(|dir| config.workspace.join(dir))
            .unwrap_or_else(|| config.pipeline.resolved_store_dir(&config.workspace));
        tracing::info!(store = %store_dir.display(), "Executing stats command");

        let stats = store_stats(&store_dir).await?;

        if self.json {
            print_json(&stats)?;
        } else {
            println!("Store: {}", store_dir.display());
            println!("  Chunks: {}", stats.chunk_count);
            println!("  Embedding: {}/{} ({} dims)", stats.provider, stats.model, stats.dimensions);
            println!("  Size on disk: {} bytes", stats.disk_bytes);
            if let Some(built_at) = &stats.built_at {
                println!("  Built at: {}", built_at);
            }
        }

        Ok(())
    }
}
