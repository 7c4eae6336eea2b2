//! Caller-owned cache of initialized pipelines.
//!
//! Pipelines are keyed by a SHA-256 digest of the workspace path and the
//! serialized `PipelineConfig`, so equal configurations share one loaded
//! store.

use crate::rag::orchestrator::RagOrchestrator;
use medrag_core::config::PipelineConfig;
use medrag_core::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Holds one orchestrator per distinct configuration.
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: RwLock<HashMap<String, Arc<RagOrchestrator>>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry key for a configuration.
    pub fn config_key(workspace: &Path, config: &PipelineConfig) -> AppResult<String> {
        let payload = serde_json::to_vec(&(workspace, config))?;
        Ok(format!("{:x}", Sha256::digest(&payload)))
    }

    /// Return the cached orchestrator for `config`, building it on first use.
    ///
    /// # Errors
    /// Store load failures surface as `StoreLoad` and nothing is cached.
    pub async fn initialize(
        &self,
        workspace: &Path,
        config: &PipelineConfig,
    ) -> AppResult<Arc<RagOrchestrator>> {
        self.get_or_build(workspace, config, false).await
    }

    /// Like `initialize`, but an unloadable store yields an orchestrator in
    /// the `RetrieverUnavailable` state.
    pub async fn initialize_lenient(
        &self,
        workspace: &Path,
        config: &PipelineConfig,
    ) -> AppResult<Arc<RagOrchestrator>> {
        self.get_or_build(workspace, config, true).await
    }

    /// Cached orchestrator for `config`, if initialized.
    pub fn get(&self, workspace: &Path, config: &PipelineConfig) -> AppResult<Option<Arc<RagOrchestrator>>> {
        let key = Self::config_key(workspace, config)?;
        Ok(self.read()?.get(&key).cloned())
    }

    /// Register an orchestrator built elsewhere under `config`'s key.
    pub fn insert(
        &self,
        workspace: &Path,
        config: &PipelineConfig,
        orchestrator: RagOrchestrator,
    ) -> AppResult<Arc<RagOrchestrator>> {
        let key = Self::config_key(workspace, config)?;
        let orchestrator = Arc::new(orchestrator);
        self.write()?.insert(key, Arc::clone(&orchestrator));
        Ok(orchestrator)
    }

    pub fn len(&self) -> usize {
        self.pipelines.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached pipeline. In-flight `ask` calls keep their `Arc`.
    pub fn shutdown(&self) -> AppResult<()> {
        let mut pipelines = self.write()?;
        let count = pipelines.len();
        pipelines.clear();
        tracing::info!(pipelines = count, "Pipeline registry shut down");
        Ok(())
    }

    async fn get_or_build(
        &self,
        workspace: &Path,
        config: &PipelineConfig,
        lenient: bool,
    ) -> AppResult<Arc<RagOrchestrator>> {
        let key = Self::config_key(workspace, config)?;

        let cached = self.read()?.get(&key).cloned();
        if let Some(existing) = cached {
            tracing::debug!(key = %key, "Reusing initialized pipeline");
            return Ok(existing);
        }

        // The lock is not held while the store loads.
        let orchestrator = if lenient {
            RagOrchestrator::from_config_lenient(workspace, config).await?
        } else {
            RagOrchestrator::from_config(workspace, config).await?
        };

        let mut pipelines = self.write()?;
        // Another caller may have finished first; keep theirs.
        let entry = pipelines
            .entry(key.clone())
            .or_insert_with(|| Arc::new(orchestrator));
        tracing::info!(key = %key, ready = entry.is_ready(), "Pipeline initialized");
        Ok(Arc::clone(entry))
    }

    fn read(
        &self,
    ) -> AppResult<std::sync::RwLockReadGuard<'_, HashMap<String, Arc<RagOrchestrator>>>> {
        self.pipelines
            .read()
            .map_err(|_| AppError::Other("pipeline registry lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> AppResult<std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<RagOrchestrator>>>> {
        self.pipelines
            .write()
            .map_err(|_| AppError::Other("pipeline registry lock poisoned".to_string()))
    }
}
