//! Embedding providers.
//!
//! Every provider reports the identity (`provider`, `model`, `dimensions`)
//! that a persisted store is checked against when it is loaded.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
