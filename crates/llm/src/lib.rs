//! Generation client crate for MedRAG.
//!
//! A provider-agnostic `LlmClient` trait plus HTTP providers for Gemini and
//! Ollama. Every failure surfaces as `AppError::Generation`, marked
//! transient or terminal so callers can decide whether to retry.
//!
//! # Example
//! ```no_run
//! use std::time::Duration;
//! use medrag_llm::{GenerationRequest, LlmClient, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new("http://localhost:11434", Duration::from_secs(60))?;
//! let request = GenerationRequest::new("What is metformin?", "llama3.2");
//! let response = client.generate(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
mod http;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{GenerationRequest, LlmClient, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{GeminiClient, OllamaClient};
pub use types::ProviderType;
