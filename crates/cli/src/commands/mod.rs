//! Command handlers for the MedRAG CLI.

pub mod ask;
pub mod knowledge;
pub mod prompts;

pub use ask::AskCommand;
pub use knowledge::{IndexCommand, PreprocessCommand, StatsCommand};
pub use prompts::PromptsCommand;

use medrag_core::AppResult;
use serde::Serialize;

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
