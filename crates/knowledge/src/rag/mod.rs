//! Retrieval-augmented answering.

pub mod orchestrator;
pub mod registry;
pub mod types;

pub use orchestrator::{RagOrchestrator, RetrieverState};
pub use registry::PipelineRegistry;
pub use types::{AnswerResult, AskOptions, PipelineStage, NO_CONTEXT_NOTICE};
