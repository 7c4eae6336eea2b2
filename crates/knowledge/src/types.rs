//! Knowledge base types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata carried by a source document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_specialty: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Any other string fields of the source record
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, String>,
}

/// A raw document before chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// Metadata of one chunk: the document's metadata plus a stable id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub medical_specialty: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// `"{doc_index}_{chunk_index}"`
    pub chunk_id: String,

    #[serde(default, flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ChunkMetadata {
    /// One-line provenance used to label a chunk in prompts.
    pub fn label(&self) -> String {
        match (&self.medical_specialty, &self.description) {
            (Some(specialty), Some(description)) => {
                format!("({}) {}", specialty.trim(), description.trim())
            }
            (Some(specialty), None) => format!("({})", specialty.trim()),
            (None, Some(description)) => description.trim().to_string(),
            (None, None) => format!("chunk {}", self.chunk_id),
        }
    }
}

/// Character range of a chunk inside the normalized document text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
}

/// A bounded piece of one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,

    pub metadata: ChunkMetadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<ChunkSpan>,
}

impl Chunk {
    pub fn id(&self) -> &str {
        &self.metadata.chunk_id
    }
}

/// A chunk paired with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Top-k hits ordered by descending score.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn chunk_ids(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.chunk.id()).collect()
    }
}

/// Which embedding setup produced the vectors of a store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreIdentity {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

impl std::fmt::Display for StoreIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({} dims)", self.provider, self.model, self.dimensions)
    }
}

/// What to do when an embedding batch fails during indexing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingFailurePolicy {
    /// Fail the whole build
    #[default]
    Abort,

    /// Drop the failing batch's chunks and keep going
    Skip,
}

impl EmbeddingFailurePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "abort" => Some(Self::Abort),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// Outcome of an index build.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildStats {
    pub chunks_in: usize,
    pub chunks_indexed: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub skipped_chunk_ids: Vec<String>,
    pub duration_ms: u64,
}

/// Summary of a persisted store, read without loading vectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreStats {
    pub chunk_count: usize,
    pub dimensions: usize,
    pub provider: String,
    pub model: String,
    pub built_at: Option<String>,
    /// Total size of the store directory
    pub disk_bytes: u64,
}
