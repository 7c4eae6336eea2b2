//! Pipeline registry lifecycle.

use super::fakes::{chunk, ScriptedLlm, DIMS};
use crate::embeddings::providers::TrigramProvider;
use crate::rag::{AskOptions, PipelineRegistry, RagOrchestrator, RetrieverState};
use crate::Indexer;
use medrag_core::config::PipelineConfig;
use medrag_core::AppError;
use medrag_prompt::{default_prompt, PromptAssembler};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Offline embeddings and a generation endpoint that is never contacted.
fn offline_config(store_dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.store_dir = store_dir.to_path_buf();
    config.embedding.provider = "trigram".to_string();
    config.embedding.model = "trigram-v1".to_string();
    config.embedding.dimensions = DIMS;
    config.embedding.api_key_env = None;
    config.generation.provider = "ollama".to_string();
    config.generation.model = "llama3.2".to_string();
    config.generation.endpoint = Some("http://127.0.0.1:9".to_string());
    config.generation.api_key_env = None;
    config
}

async fn build_store(dir: &Path) {
    Indexer::new(Arc::new(TrigramProvider::new(DIMS)))
        .build(vec![chunk("0_0", "metformin 500 mg")], dir)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_same_config_shares_one_pipeline() {
    let temp = TempDir::new().unwrap();
    let store_dir = temp.path().join("store");
    build_store(&store_dir).await;
    let config = offline_config(&store_dir);
    let registry = PipelineRegistry::new();

    let first = registry.initialize(temp.path(), &config).await.unwrap();
    let second = registry.initialize(temp.path(), &config).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.is_ready());
    assert_eq!(registry.len(), 1);

    let mut other = config.clone();
    other.defaults.k = 2;
    let third = registry.initialize(temp.path(), &other).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_shutdown_clears_cache_but_not_handles() {
    let temp = TempDir::new().unwrap();
    let store_dir = temp.path().join("store");
    build_store(&store_dir).await;
    let config = offline_config(&store_dir);
    let registry = PipelineRegistry::new();

    let held = registry.initialize(temp.path(), &config).await.unwrap();
    registry.shutdown().unwrap();

    assert!(registry.is_empty());
    assert!(registry.get(temp.path(), &config).unwrap().is_none());
    assert!(held.is_ready());

    let rebuilt = registry.initialize(temp.path(), &config).await.unwrap();
    assert!(!Arc::ptr_eq(&held, &rebuilt));
}

#[tokio::test]
async fn test_missing_store_is_not_cached() {
    let temp = TempDir::new().unwrap();
    let config = offline_config(&temp.path().join("absent"));
    let registry = PipelineRegistry::new();

    let err = registry.initialize(temp.path(), &config).await.err().unwrap();

    assert!(matches!(err, AppError::StoreLoad(_)));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_lenient_pipeline_reports_retriever_unavailable() {
    let temp = TempDir::new().unwrap();
    let config = offline_config(&temp.path().join("absent"));
    let registry = PipelineRegistry::new();

    let rag = registry.initialize_lenient(temp.path(), &config).await.unwrap();
    assert!(!rag.is_ready());
    assert!(matches!(rag.retriever_state(), RetrieverState::Unavailable(_)));

    let err = rag.ask(AskOptions::new("What dose?")).await.unwrap_err();
    assert!(matches!(err, AppError::RetrieverUnavailable(_)));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut config = offline_config(&temp.path().join("store"));
    config.embedding.provider = "word2vec".to_string();

    let err = PipelineRegistry::new()
        .initialize(temp.path(), &config)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, AppError::Config(_)));
}

#[tokio::test]
async fn test_inserted_pipeline_is_served_by_key() {
    let temp = TempDir::new().unwrap();
    let config = offline_config(&temp.path().join("store"));
    let llm = Arc::new(ScriptedLlm::answering("unused"));
    let assembler = PromptAssembler::new(default_prompt(), 4_000).unwrap();
    let orchestrator = RagOrchestrator::new(
        RetrieverState::Unavailable("not built".to_string()),
        assembler,
        llm,
        &config,
    );
    let registry = PipelineRegistry::new();

    let inserted = registry.insert(temp.path(), &config, orchestrator).unwrap();
    let fetched = registry.get(temp.path(), &config).unwrap().unwrap();
    assert!(Arc::ptr_eq(&inserted, &fetched));

    let served = registry.initialize(temp.path(), &config).await.unwrap();
    assert!(Arc::ptr_eq(&inserted, &served));
}

#[test]
fn test_config_key_depends_on_workspace_and_config() {
    let config = offline_config(Path::new("store"));
    let a = PipelineRegistry::config_key(Path::new("/a"), &config).unwrap();
    let b = PipelineRegistry::config_key(Path::new("/b"), &config).unwrap();
    let again = PipelineRegistry::config_key(Path::new("/a"), &config).unwrap();

    assert_eq!(a, again);
    assert_ne!(a, b);
    assert_eq!(a.len(), 64);
}
