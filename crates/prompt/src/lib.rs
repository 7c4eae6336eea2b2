//! Prompt system for MedRAG.
//!
//! - YAML prompt definitions with a built-in default
//! - Handlebars template rendering
//! - Size-bounded assembly of ranked retrieval contexts

pub mod assembler;
pub mod builtin;
pub mod loader;
pub mod types;

// Re-export main types
pub use assembler::PromptAssembler;
pub use builtin::{default_prompt, DEFAULT_PROMPT_ID};
pub use loader::{list_prompts, load_prompt, resolve_prompt, validate_prompt};
pub use types::{AssembledPrompt, PromptContext, PromptDefinition, TruncationWarning};
