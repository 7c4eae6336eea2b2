//! LanceDB-backed vector store with cosine ranking.
//!
//! A store is immutable once created or loaded; share it behind an `Arc`.

pub mod lance;

pub use lance::{store_stats, CHUNKS_TABLE, INFO_TABLE};

use crate::types::{Chunk, ScoredChunk, StoreIdentity};
use lancedb::Table;
use medrag_core::{AppError, AppResult};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Handle to a persisted chunks table plus the embedding identity it was
/// built with.
pub struct VectorStore {
    identity: StoreIdentity,
    table: Table,
    len: usize,
    built_at: Option<String>,
}

impl fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStore")
            .field("identity", &self.identity)
            .field("len", &self.len)
            .field("built_at", &self.built_at)
            .finish()
    }
}

impl VectorStore {
    /// Write `entries` to `dir` in order and open the result.
    ///
    /// Any store already at `dir` is replaced only once the new one is
    /// fully written.
    ///
    /// # Errors
    /// `InvalidInput` on a duplicate chunk id or zero dimensions,
    /// `Embedding` on a row of the wrong length.
    pub async fn create(
        dir: &Path,
        identity: StoreIdentity,
        entries: Vec<(Chunk, Vec<f32>)>,
    ) -> AppResult<Self> {
        let dims = identity.dimensions;
        if dims == 0 {
            return Err(AppError::InvalidInput(
                "store dimensions must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for (chunk, vector) in &entries {
            if vector.len() != dims {
                return Err(AppError::Embedding(format!(
                    "chunk {} has a {}-dimensional embedding, store expects {}",
                    chunk.id(),
                    vector.len(),
                    dims
                )));
            }
            if !seen.insert(chunk.id()) {
                return Err(AppError::InvalidInput(format!(
                    "duplicate chunk_id '{}'",
                    chunk.id()
                )));
            }
        }

        let built_at = chrono::Utc::now().to_rfc3339();
        lance::write(dir, &identity, &built_at, &entries).await?;
        Self::load(dir, &identity).await
    }

    /// Open a store, verifying it against the configured embedding identity.
    ///
    /// # Errors
    /// `StoreLoad` when the directory or a table is missing, the tables
    /// disagree with each other, or the embedding provider, model or
    /// dimension differ from `expected`.
    pub async fn load(dir: &Path, expected: &StoreIdentity) -> AppResult<Self> {
        let (table, info) = lance::open(dir).await?;

        if info.identity.dimensions != expected.dimensions {
            return Err(AppError::StoreLoad(format!(
                "Store {:?} holds {}-dimensional vectors but the configured embedding model produces {}",
                dir, info.identity.dimensions, expected.dimensions
            )));
        }
        if info.identity.provider != expected.provider || info.identity.model != expected.model {
            return Err(AppError::StoreLoad(format!(
                "Store {:?} was built with {}/{} but the configured embedding is {}/{}",
                dir,
                info.identity.provider,
                info.identity.model,
                expected.provider,
                expected.model
            )));
        }

        tracing::info!(
            path = %dir.display(),
            chunks = info.chunk_count,
            identity = %info.identity,
            "Loaded vector store"
        );

        Ok(Self {
            identity: info.identity,
            table,
            len: info.chunk_count,
            built_at: info.built_at,
        })
    }

    pub fn identity(&self) -> &StoreIdentity {
        &self.identity
    }

    pub fn dimensions(&self) -> usize {
        self.identity.dimensions
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn built_at(&self) -> Option<&str> {
        self.built_at.as_deref()
    }

    /// All chunks in insertion order.
    pub async fn chunks(&self) -> AppResult<Vec<Chunk>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let mut rows = lance::scan(&self.table, self.len).await?;
        rows.sort_by_key(|row| row.id);
        Ok(rows.into_iter().map(|row| row.chunk).collect())
    }

    /// Top-k by cosine similarity.
    ///
    /// Ties keep insertion order; NaN scores sort last.
    pub async fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<ScoredChunk>> {
        if query.len() != self.dimensions() {
            return Err(AppError::Embedding(format!(
                "query embedding has {} dimensions, store has {}",
                query.len(),
                self.dimensions()
            )));
        }
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let rows = lance::nearest(&self.table, query, self.len).await?;
        let query_norm = norm(query);
        let mut scored: Vec<(u64, f32, Chunk)> = rows
            .into_iter()
            .map(|row| {
                let score = cosine(query, query_norm, &row.vector);
                (row.id, score, row.chunk)
            })
            .collect();

        scored.sort_by(|a, b| descending_nan_last(a.1, b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        tracing::debug!(requested = k, returned = scored.len(), "Vector search");

        Ok(scored
            .into_iter()
            .map(|(_, score, chunk)| ScoredChunk { chunk, score })
            .collect())
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32]) -> f32 {
    let b_norm = norm(b);
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}

fn descending_nan_last(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}
