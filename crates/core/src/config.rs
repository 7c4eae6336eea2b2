//! Configuration management for MedRAG.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config files (.medrag/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with most state stored in `.medrag/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Embedding providers understood by the knowledge crate.
pub const EMBEDDING_PROVIDERS: [&str; 3] = ["gemini", "ollama", "trigram"];

/// Generation providers understood by the llm crate.
pub const GENERATION_PROVIDERS: [&str; 2] = ["gemini", "ollama"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .medrag/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Retrieval and generation settings
    pub pipeline: PipelineConfig,
}

/// Everything needed to build, load and query one knowledge base.
///
/// Two orchestrators built from equal `PipelineConfig` values are
/// interchangeable, which is what the pipeline registry relies on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// LanceDB directory holding the `chunks` and `store_info` tables
    pub store_dir: PathBuf,

    pub embedding: EmbeddingSettings,

    pub generation: GenerationSettings,

    pub chunking: ChunkingSettings,

    /// Per-call defaults for `ask`
    pub defaults: QueryDefaults,

    pub prompt: PromptSettings,

    pub retry: RetrySettings,

    /// Upper bound for any single embedding or generation call
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// Provider name: "gemini", "ollama", "trigram"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Texts per embedding request during indexing
    pub batch_size: usize,

    /// Embedding batches in flight during indexing
    pub concurrency: usize,

    /// Custom service endpoint
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    /// Provider name: "gemini", "ollama"
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Custom service endpoint
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkingSettings {
    /// Maximum characters per chunk
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryDefaults {
    /// Number of chunks to retrieve
    pub k: usize,

    /// Sampling temperature in [0, 1]
    pub temperature: f32,

    /// Response length bound
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptSettings {
    /// Prompt definition to render (built-in or `.medrag/prompts/<id>.yml`)
    pub prompt_id: String,

    /// Hard cap on the assembled prompt, in characters
    pub max_prompt_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Generation attempts for transient failures (1 disables retries)
    pub max_generation_attempts: u32,

    /// Backoff before the second attempt; doubles afterwards
    pub initial_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".medrag/store"),
            embedding: EmbeddingSettings::default(),
            generation: GenerationSettings::default(),
            chunking: ChunkingSettings::default(),
            defaults: QueryDefaults::default(),
            prompt: PromptSettings::default(),
            retry: RetrySettings::default(),
            request_timeout_secs: 60,
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "models/embedding-001".to_string(),
            dimensions: 768,
            batch_size: 32,
            concurrency: 2,
            endpoint: None,
            api_key_env: Some("GEMINI_API_KEY".to_string()),
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            endpoint: None,
            api_key_env: Some("GEMINI_API_KEY".to_string()),
        }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            chunk_overlap: 120,
        }
    }
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            k: 5,
            temperature: 0.0,
            max_output_tokens: 512,
        }
    }
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            prompt_id: "medrag.answer.default".to_string(),
            max_prompt_chars: 20_000,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_generation_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl PipelineConfig {
    /// Check ranges and provider names.
    pub fn validate(&self) -> AppResult<()> {
        if !EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if !GENERATION_PROVIDERS.contains(&self.generation.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown generation provider: {}. Supported: {}",
                self.generation.provider,
                GENERATION_PROVIDERS.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be greater than 0".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 || self.embedding.concurrency == 0 {
            return Err(AppError::Config(
                "embedding.batchSize and embedding.concurrency must be at least 1".to_string(),
            ));
        }

        if self.chunking.chunk_size == 0 || self.chunking.chunk_overlap >= self.chunking.chunk_size
        {
            return Err(AppError::Config(format!(
                "chunking.chunkOverlap ({}) must be smaller than chunking.chunkSize ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }

        if self.defaults.k == 0 {
            return Err(AppError::Config("defaults.k must be at least 1".to_string()));
        }

        if !(0.0..=1.0).contains(&self.defaults.temperature) {
            return Err(AppError::Config(format!(
                "defaults.temperature must be within [0, 1], got {}",
                self.defaults.temperature
            )));
        }

        if self.defaults.max_output_tokens == 0 {
            return Err(AppError::Config(
                "defaults.maxOutputTokens must be greater than 0".to_string(),
            ));
        }

        if self.prompt.max_prompt_chars == 0 {
            return Err(AppError::Config(
                "prompt.maxPromptChars must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_generation_attempts == 0 {
            return Err(AppError::Config(
                "retry.maxGenerationAttempts must be at least 1".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "requestTimeoutSecs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve `store_dir` against the workspace when it is relative.
    pub fn resolved_store_dir(&self, workspace: &Path) -> PathBuf {
        if self.store_dir.is_absolute() {
            self.store_dir.clone()
        } else {
            workspace.join(&self.store_dir)
        }
    }
}

/// Read an API key from the environment variable named in a settings block.
pub fn resolve_api_key(api_key_env: Option<&str>) -> Option<String> {
    api_key_env
        .and_then(|name| std::env::var(name).ok())
        .filter(|key| !key.trim().is_empty())
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    pipeline: Option<PipelineConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `MEDRAG_WORKSPACE`: Override workspace path
    /// - `MEDRAG_CONFIG`: Path to config file
    /// - `MEDRAG_STORE`: Vector store directory
    /// - `MEDRAG_EMBEDDING_PROVIDER` / `MEDRAG_EMBEDDING_MODEL`
    /// - `MEDRAG_GENERATION_PROVIDER` / `MEDRAG_GENERATION_MODEL`
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use medrag_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Store: {:?}", config.pipeline.store_dir);
    /// ```
    pub fn load() -> AppResult<Self> {
        let workspace = std::env::var("MEDRAG_WORKSPACE").ok().map(PathBuf::from);
        let config_file = std::env::var("MEDRAG_CONFIG").ok().map(PathBuf::from);
        Self::load_from(workspace, config_file)
    }

    /// Load configuration for an explicit workspace and config file.
    ///
    /// Both arguments fall back to the current directory and
    /// `<workspace>/.medrag/config.yaml` respectively.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = workspace {
            config.workspace = workspace;
        }
        config.config_file = config_file;

        // Validate workspace exists
        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.medrag_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file does not exist: {:?}",
                config_path
            )));
        }

        // Environment variables override YAML config
        if let Ok(store) = std::env::var("MEDRAG_STORE") {
            config.pipeline.store_dir = PathBuf::from(store);
        }

        if let Ok(provider) = std::env::var("MEDRAG_EMBEDDING_PROVIDER") {
            config.pipeline.embedding.provider = provider;
        }

        if let Ok(model) = std::env::var("MEDRAG_EMBEDDING_MODEL") {
            config.pipeline.embedding.model = model;
        }

        if let Ok(provider) = std::env::var("MEDRAG_GENERATION_PROVIDER") {
            config.pipeline.generation.provider = provider;
        }

        if let Ok(model) = std::env::var("MEDRAG_GENERATION_MODEL") {
            config.pipeline.generation.model = model;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        // Check for NO_COLOR environment variable
        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(pipeline) = config_file.pipeline {
            result.pipeline = pipeline;
        }

        tracing::debug!("Merged configuration from {:?}", path);
        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Gives precedence to command-line flags over environment variables
    /// and the config file.
    pub fn with_overrides(
        mut self,
        store_dir: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(store_dir) = store_dir {
            self.pipeline.store_dir = store_dir;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .medrag directory.
    pub fn medrag_dir(&self) -> PathBuf {
        self.workspace.join(".medrag")
    }

    /// Ensure the .medrag directory exists.
    pub fn ensure_medrag_dir(&self) -> AppResult<()> {
        let medrag_dir = self.medrag_dir();
        if !medrag_dir.exists() {
            std::fs::create_dir_all(&medrag_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .medrag directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Pipeline settings with the store directory resolved against the workspace.
    pub fn resolved_pipeline(&self) -> PipelineConfig {
        let mut pipeline = self.pipeline.clone();
        pipeline.store_dir = self.pipeline.resolved_store_dir(&self.workspace);
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.pipeline.embedding.provider, "gemini");
        assert_eq!(config.pipeline.chunking.chunk_size, 600);
        assert_eq!(config.pipeline.chunking.chunk_overlap, 120);
        assert_eq!(config.pipeline.defaults.k, 5);
        assert!(!config.verbose);
        assert!(!config.no_color);
        assert!(config.pipeline.validate().is_ok());
    }

    #[test]
    fn test_medrag_dir() {
        let config = AppConfig::default();
        assert!(config.medrag_dir().ends_with(".medrag"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden =
            config.with_overrides(Some(PathBuf::from("/tmp/store")), None, true, false);

        assert_eq!(overridden.pipeline.store_dir, PathBuf::from("/tmp/store"));
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
pipeline:
  embedding:
    provider: trigram
    model: trigram-v1
    dimensions: 256
  defaults:
    k: 3
logging:
  color: false
"#,
        )
        .unwrap();

        let config = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(config.pipeline.embedding.provider, "trigram");
        assert_eq!(config.pipeline.embedding.dimensions, 256);
        assert_eq!(config.pipeline.embedding.batch_size, 32);
        assert_eq!(config.pipeline.defaults.k, 3);
        assert_eq!(config.pipeline.defaults.max_output_tokens, 512);
        assert_eq!(config.pipeline.generation.provider, "gemini");
        assert!(config.no_color);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut pipeline = PipelineConfig::default();
        pipeline.defaults.temperature = 1.5;
        assert!(pipeline.validate().is_err());

        let mut pipeline = PipelineConfig::default();
        pipeline.chunking.chunk_overlap = pipeline.chunking.chunk_size;
        assert!(pipeline.validate().is_err());

        let mut pipeline = PipelineConfig::default();
        pipeline.generation.provider = "unknown".to_string();
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn test_resolved_store_dir() {
        let pipeline = PipelineConfig::default();
        let resolved = pipeline.resolved_store_dir(Path::new("/work"));
        assert_eq!(resolved, PathBuf::from("/work/.medrag/store"));

        let absolute = PipelineConfig {
            store_dir: PathBuf::from("/data/store"),
            ..PipelineConfig::default()
        };
        assert_eq!(
            absolute.resolved_store_dir(Path::new("/work")),
            PathBuf::from("/data/store")
        );
    }
}
