//! RAG request and response types.

use crate::types::Chunk;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of answers produced without any retrieved context.
pub const NO_CONTEXT_NOTICE: &str =
    "No supporting context was found in the knowledge base; the answer below is not grounded in any source.";

/// One question plus optional per-call overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AskOptions {
    pub question: String,

    /// Chunks to retrieve (default from configuration)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,

    /// Sampling temperature in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl AskOptions {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

/// Grounded answer with the evidence it was generated from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResult {
    pub answer: String,

    /// Chunks rendered into the prompt, best first
    pub contexts: Vec<Chunk>,

    /// Exact prompt sent to the generation model
    pub prompt: String,

    /// Similarity of each context, aligned with `contexts`
    pub scores: Vec<f32>,

    /// Non-fatal conditions such as prompt truncation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Orchestrator progress for one `ask` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Idle,
    Retrieving,
    Assembling,
    Generating,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Retrieving => "retrieving",
            Self::Assembling => "assembling",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
