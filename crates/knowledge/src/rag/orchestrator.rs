//! Retrieve, assemble, generate.
//!
//! One `ask` walks `Idle -> Retrieving -> Assembling -> Generating -> Done`
//! and lands in `Failed` on any error. Input validation happens before any
//! external call.

use crate::embeddings::create_provider;
use crate::rag::types::{AnswerResult, AskOptions, PipelineStage, NO_CONTEXT_NOTICE};
use crate::retriever::Retriever;
use crate::store::VectorStore;
use medrag_core::config::{PipelineConfig, QueryDefaults, RetrySettings};
use medrag_core::{AppError, AppResult};
use medrag_llm::{GenerationRequest, LlmClient, LlmResponse};
use medrag_prompt::{resolve_prompt, PromptAssembler, PromptContext};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Longest pause between generation attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Whether the orchestrator can search.
#[derive(Debug)]
pub enum RetrieverState {
    Ready(Retriever),
    Unavailable(String),
}

/// Runs the full question answering pipeline.
pub struct RagOrchestrator {
    retriever: RetrieverState,
    assembler: PromptAssembler,
    llm: Arc<dyn LlmClient>,
    model: String,
    defaults: QueryDefaults,
    retry: RetrySettings,
    timeout: Duration,
}

impl RagOrchestrator {
    /// Assemble an orchestrator from ready-made parts.
    pub fn new(
        retriever: RetrieverState,
        assembler: PromptAssembler,
        llm: Arc<dyn LlmClient>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            retriever,
            assembler,
            llm,
            model: config.generation.model.clone(),
            defaults: config.defaults.clone(),
            retry: config.retry.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Build providers, resolve the prompt and load the store described by
    /// `config`. `config.store_dir` is resolved against `workspace`.
    ///
    /// # Errors
    /// `StoreLoad` if the store is missing or built with another embedding
    /// setup; `Config`/`Prompt` for configuration problems.
    pub async fn from_config(workspace: &Path, config: &PipelineConfig) -> AppResult<Self> {
        Self::build(workspace, config, false).await
    }

    /// Like `from_config`, but a store that fails to load leaves the
    /// orchestrator in the `RetrieverUnavailable` state instead of failing.
    pub async fn from_config_lenient(workspace: &Path, config: &PipelineConfig) -> AppResult<Self> {
        Self::build(workspace, config, true).await
    }

    async fn build(workspace: &Path, config: &PipelineConfig, lenient: bool) -> AppResult<Self> {
        config.validate()?;
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let embedder = create_provider(&config.embedding, timeout)?;
        let llm = medrag_llm::create_client(&config.generation, timeout)?;

        let definition = resolve_prompt(workspace, &config.prompt.prompt_id)?;
        let assembler = PromptAssembler::new(definition, config.prompt.max_prompt_chars)?;

        let store_dir = config.resolved_store_dir(workspace);
        let retriever = match VectorStore::load(&store_dir, &embedder.identity())
            .await
            .and_then(|store| Retriever::new(Arc::new(store), embedder))
        {
            Ok(retriever) => RetrieverState::Ready(retriever.with_timeout(timeout)),
            Err(e @ AppError::StoreLoad(_)) if lenient => {
                tracing::error!(path = %store_dir.display(), error = %e, "Retriever unavailable");
                RetrieverState::Unavailable(e.to_string())
            }
            Err(e) => return Err(e),
        };

        Ok(Self::new(retriever, assembler, llm, config))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.retriever, RetrieverState::Ready(_))
    }

    pub fn retriever_state(&self) -> &RetrieverState {
        &self.retriever
    }

    /// Answer one question.
    #[tracing::instrument(skip(self, options), fields(k = options.k))]
    pub async fn ask(&self, options: AskOptions) -> AppResult<AnswerResult> {
        let result = self.run(options).await;
        match &result {
            Ok(answer) => tracing::info!(
                stage = %PipelineStage::Done,
                contexts = answer.contexts.len(),
                "Answer ready"
            ),
            Err(e) => tracing::error!(stage = %PipelineStage::Failed, error = %e, "Ask failed"),
        }
        result
    }

    async fn run(&self, options: AskOptions) -> AppResult<AnswerResult> {
        tracing::debug!(stage = %PipelineStage::Idle, "Validating request");
        let question = options.question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidInput("question must not be empty".to_string()));
        }
        let k = options.k.unwrap_or(self.defaults.k);
        if k == 0 {
            return Err(AppError::InvalidInput("k must be at least 1".to_string()));
        }
        let request = GenerationRequest::new(String::new(), self.model.clone())
            .with_temperature(options.temperature.unwrap_or(self.defaults.temperature))
            .with_max_output_tokens(
                options
                    .max_output_tokens
                    .unwrap_or(self.defaults.max_output_tokens),
            );
        request.validate()?;

        let retriever = match &self.retriever {
            RetrieverState::Ready(retriever) => retriever,
            RetrieverState::Unavailable(reason) => {
                return Err(AppError::RetrieverUnavailable(reason.clone()))
            }
        };

        tracing::debug!(stage = %PipelineStage::Retrieving, k, "Retrieving context");
        let retrieval = retriever.retrieve(question, k).await?;
        let grounded = !retrieval.is_empty();
        if !grounded {
            tracing::warn!("Retrieval returned no chunks; answering without context");
        }

        tracing::debug!(stage = %PipelineStage::Assembling, hits = retrieval.len(), "Assembling prompt");
        let contexts: Vec<PromptContext> = retrieval
            .hits
            .iter()
            .map(|hit| PromptContext::new(hit.chunk.metadata.label(), hit.chunk.text.clone()))
            .collect();
        let assembled = self.assembler.assemble(question, &contexts)?;

        let mut warnings = Vec::new();
        if let Some(warning) = &assembled.warning {
            warnings.push(warning.to_string());
        }

        tracing::debug!(
            stage = %PipelineStage::Generating,
            prompt_chars = assembled.text.chars().count(),
            "Generating answer"
        );
        let request = GenerationRequest {
            prompt: assembled.text.clone(),
            ..request
        };
        let response = self.generate_with_retry(&request).await?;

        let answer = if grounded {
            response.content
        } else {
            warnings.push("no supporting context was retrieved".to_string());
            format!("{}\n\n{}", NO_CONTEXT_NOTICE, response.content)
        };

        let (contexts, scores) = retrieval
            .hits
            .into_iter()
            .take(assembled.included)
            .map(|hit| (hit.chunk, hit.score))
            .unzip();

        Ok(AnswerResult {
            answer,
            contexts,
            prompt: assembled.text,
            scores,
            warnings,
        })
    }

    /// Retry transient failures with exponential backoff; fail fast otherwise.
    async fn generate_with_retry(&self, request: &GenerationRequest) -> AppResult<LlmResponse> {
        let max_attempts = self.retry.max_generation_attempts.max(1);
        let mut backoff = Duration::from_millis(self.retry.initial_backoff_ms);
        let mut attempt = 1;

        loop {
            let outcome = match tokio::time::timeout(self.timeout, self.llm.generate(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(AppError::transient(format!(
                    "generation timed out after {}s",
                    self.timeout.as_secs_f32()
                ))),
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient generation failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(attempts = attempt, "Generation retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(MAX_BACKOFF)
}
