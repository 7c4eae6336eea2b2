//! Index construction, persistence and retrieval over the built store.

use super::fakes::{chunk, FlakyEmbedder, ShortEmbedder, DIMS};
use crate::corpus::read_chunks;
use crate::embeddings::providers::TrigramProvider;
use crate::embeddings::EmbeddingProvider;
use crate::retriever::Retriever;
use crate::store::VectorStore;
use crate::types::{Chunk, EmbeddingFailurePolicy};
use crate::{index, load_corpus, preprocess, store_stats, Chunker, Indexer};
use medrag_core::config::EmbeddingSettings;
use medrag_core::AppError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const CORPUS: &str = r#"[
  {"transcription": "Patient has type 2 diabetes. Prescribed metformin 500 mg twice daily.", "medical_specialty": "Endocrinology", "description": "Diabetes follow-up"},
  {"transcription": "   ", "medical_specialty": "Radiology"},
  {"transcription": "Chest x-ray shows no acute cardiopulmonary process. Heart size is normal.", "medical_specialty": "Radiology", "sample_name": "CXR"},
  {"transcription": "Right knee arthroscopy with partial medial meniscectomy. Tolerated well.", "medical_specialty": "Orthopedic"}
]"#;

/// Column layout of the public transcription dataset, unnamed index first.
const CSV_CORPUS: &str = ",description,medical_specialty,sample_name,transcription,keywords
0,Diabetes follow-up,Endocrinology,Diabetes,\"Patient has type 2 diabetes. Prescribed metformin 500 mg, twice daily.\",diabetes
1,Blank note,Radiology,Empty,,
2,Echo,Cardiovascular / Pulmonary,Echo,Normal left ventricular size and function.,echo
";

fn trigram() -> Arc<dyn EmbeddingProvider> {
    Arc::new(TrigramProvider::new(DIMS))
}

fn trigram_settings() -> EmbeddingSettings {
    EmbeddingSettings {
        provider: "trigram".to_string(),
        model: "trigram-v1".to_string(),
        dimensions: DIMS,
        batch_size: 2,
        concurrency: 2,
        endpoint: None,
        api_key_env: None,
    }
}

fn flaky_chunks() -> Vec<Chunk> {
    vec![
        chunk("0_0", "metformin started"),
        chunk("0_1", "SLOW insulin titration"),
        chunk("1_0", "FAIL lisinopril refill"),
        chunk("2_0", "knee effusion"),
    ]
}

#[tokio::test]
async fn test_skip_policy_records_failed_chunks_in_order() {
    let embedder = Arc::new(FlakyEmbedder::new());
    let indexer = Indexer::new(embedder.clone())
        .with_batch_size(1)
        .with_concurrency(4)
        .with_policy(EmbeddingFailurePolicy::Skip);

    let temp = TempDir::new().unwrap();
    let (store, stats) = indexer
        .build(flaky_chunks(), &temp.path().join("store"))
        .await
        .unwrap();

    assert_eq!(stats.chunks_in, 4);
    assert_eq!(stats.chunks_indexed, 3);
    assert_eq!(stats.batches, 4);
    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.skipped_chunk_ids, vec!["1_0".to_string()]);

    let chunks = store.chunks().await.unwrap();
    let ids: Vec<&str> = chunks.iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec!["0_0", "0_1", "2_0"]);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_abort_policy_fails_and_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("store");

    let err = Indexer::new(Arc::new(FlakyEmbedder::new()))
        .with_batch_size(2)
        .build(flaky_chunks(), &dir)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Embedding(_)));
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_duplicate_chunk_ids_rejected_before_embedding() {
    let embedder = Arc::new(FlakyEmbedder::new());
    let chunks = vec![chunk("0_0", "a"), chunk("0_1", "b"), chunk("0_0", "c")];

    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("store");

    let err = Indexer::new(embedder.clone()).build(chunks, &dir).await.unwrap_err();

    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_wrong_dimension_embedding_fails_batch() {
    let temp = TempDir::new().unwrap();
    let err = Indexer::new(Arc::new(ShortEmbedder))
        .build(vec![chunk("0_0", "metformin")], &temp.path().join("store"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Embedding(_)));
}

#[tokio::test]
async fn test_small_store_returns_every_chunk() {
    let temp = TempDir::new().unwrap();
    let (store, _) = Indexer::new(trigram())
        .build(
            vec![chunk("0_0", "metformin"), chunk("0_1", "insulin")],
            &temp.path().join("store"),
        )
        .await
        .unwrap();
    let retriever = Retriever::new(Arc::new(store), trigram()).unwrap();

    let result = retriever.retrieve("diabetes medication", 10).await.unwrap();

    assert_eq!(result.len(), 2);
    assert!(result.hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_rebuild_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let corpus_path = temp.path().join("corpus.json");
    std::fs::write(&corpus_path, CORPUS).unwrap();
    let chunker = Chunker::new(40, 8).unwrap();

    let mut rankings = Vec::new();
    for run in 0..2 {
        let corpus = load_corpus(&corpus_path).unwrap();
        let chunks = chunker.split_all(corpus.iter());
        let (store, _) = Indexer::new(trigram())
            .with_concurrency(3)
            .with_batch_size(2)
            .build(chunks, &temp.path().join(format!("store-{}", run)))
            .await
            .unwrap();
        let retriever = Retriever::new(Arc::new(store), trigram()).unwrap();
        let result = retriever.retrieve("metformin dose", 4).await.unwrap();
        rankings.push(
            result
                .hits
                .iter()
                .map(|h| (h.chunk.id().to_string(), h.score))
                .collect::<Vec<_>>(),
        );
    }

    assert_eq!(rankings[0], rankings[1]);
}

#[tokio::test]
async fn test_persisted_store_retrieves_like_the_original() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("store");
    let chunks = vec![
        chunk("0_0", "Metformin 500 mg twice daily."),
        chunk("1_0", "No acute cardiopulmonary process."),
        chunk("2_0", "Partial medial meniscectomy."),
    ];

    let (store, _) = Indexer::new(trigram()).build(chunks, &dir).await.unwrap();
    let loaded = VectorStore::load(&dir, &trigram().identity()).await.unwrap();
    assert_eq!(loaded.chunks().await.unwrap(), store.chunks().await.unwrap());

    let original = Retriever::new(Arc::new(store), trigram()).unwrap();
    let reloaded = Retriever::new(Arc::new(loaded), trigram()).unwrap();

    for query in ["metformin", "chest x-ray", "knee surgery"] {
        let a = original.retrieve(query, 3).await.unwrap();
        let b = reloaded.retrieve(query, 3).await.unwrap();
        assert_eq!(a.chunk_ids(), b.chunk_ids());
        for (x, y) in a.hits.iter().zip(&b.hits) {
            assert!((x.score - y.score).abs() < 1e-6);
        }
    }
}

#[tokio::test]
async fn test_store_from_other_provider_is_rejected_on_load() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("store");
    Indexer::new(trigram())
        .build(vec![chunk("0_0", "metformin")], &dir)
        .await
        .unwrap();

    let other = TrigramProvider::with_model("trigram-v2", DIMS).identity();
    let err = VectorStore::load(&dir, &other).await.unwrap_err();
    assert!(matches!(err, AppError::StoreLoad(_)));

    let wider = TrigramProvider::new(DIMS * 2).identity();
    let err = VectorStore::load(&dir, &wider).await.unwrap_err();
    assert!(matches!(err, AppError::StoreLoad(_)));
}

#[tokio::test]
async fn test_preprocess_then_index_files() {
    let temp = TempDir::new().unwrap();
    let corpus_path = temp.path().join("corpus.json");
    let chunks_path = temp.path().join("chunks.jsonl");
    let store_dir = temp.path().join("store");
    std::fs::write(&corpus_path, CORPUS).unwrap();

    let prep = preprocess(&corpus_path, &chunks_path, &Chunker::new(40, 8).unwrap()).unwrap();
    assert_eq!(prep.documents, 3);
    assert_eq!(prep.dropped_rows, 1);

    let chunks = read_chunks(&chunks_path).unwrap();
    assert_eq!(chunks.len(), prep.chunks);
    assert!(chunks.iter().all(|c| c.text.chars().count() <= 40));
    assert!(chunks.iter().any(|c| c.id() == "2_0"));
    assert!(!chunks.iter().any(|c| c.id().starts_with("1_")));

    let stats = index(
        &chunks_path,
        &store_dir,
        &trigram_settings(),
        EmbeddingFailurePolicy::Abort,
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    assert_eq!(stats.chunks_indexed, prep.chunks);
    let stats = store_stats(&store_dir).await.unwrap();
    assert_eq!(stats.chunk_count, prep.chunks);
    assert_eq!(stats.model, "trigram-v1");

    let store = VectorStore::load(&store_dir, &trigram().identity()).await.unwrap();
    assert_eq!(store.len(), prep.chunks);
    let stored = store.chunks().await.unwrap();
    assert_eq!(stored[0].metadata.medical_specialty.as_deref(), Some("Endocrinology"));
}

#[tokio::test]
async fn test_preprocess_csv_corpus_then_index() {
    let temp = TempDir::new().unwrap();
    let corpus_path = temp.path().join("medical_transcriptions.csv");
    let chunks_path = temp.path().join("chunks.json");
    let store_dir = temp.path().join("store");
    std::fs::write(&corpus_path, CSV_CORPUS).unwrap();

    let prep = preprocess(&corpus_path, &chunks_path, &Chunker::new(200, 20).unwrap()).unwrap();
    assert_eq!(prep.documents, 2);
    assert_eq!(prep.dropped_rows, 1);

    let chunks = read_chunks(&chunks_path).unwrap();
    assert!(chunks.iter().any(|c| c.id() == "0_0"));
    assert!(chunks.iter().any(|c| c.id() == "2_0"));
    assert!(!chunks.iter().any(|c| c.id().starts_with("1_")));

    let cardiology = chunks.iter().find(|c| c.id() == "2_0").unwrap();
    assert_eq!(cardiology.metadata.medical_specialty.as_deref(), Some("Cardiovascular / Pulmonary"));
    assert_eq!(cardiology.metadata.extra.get("sample_name").map(String::as_str), Some("Echo"));

    index(
        &chunks_path,
        &store_dir,
        &trigram_settings(),
        EmbeddingFailurePolicy::Abort,
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    let store = VectorStore::load(&store_dir, &trigram().identity()).await.unwrap();
    let retriever = Retriever::new(Arc::new(store), trigram()).unwrap();
    let result = retriever.retrieve("metformin dose", 1).await.unwrap();
    assert_eq!(result.chunk_ids(), vec!["0_0"]);
}
