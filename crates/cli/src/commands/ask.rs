//! Ask command handler.
//!
//! Answers one question through the RAG pipeline and prints the answer
//! with the sources it was grounded in.

use crate::commands::print_json;
use clap::Args;
use medrag_core::{config::AppConfig, AppError, AppResult};
use medrag_knowledge::{AnswerResult, AskOptions, PipelineRegistry};
use std::path::PathBuf;

/// Answer a question from the knowledge base
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Number of chunks to retrieve (default from config)
    #[arg(short = 'k', long)]
    pub k: Option<usize>,

    /// Sampling temperature in [0, 1] (default from config)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum tokens in the answer (default from config)
    #[arg(long)]
    pub max_output_tokens: Option<u32>,

    /// Print the assembled prompt to stderr
    #[arg(long)]
    pub show_prompt: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let question = self.read_question()?;
        let mut options = AskOptions::new(question);
        options.k = self.k;
        options.temperature = self.temperature;
        options.max_output_tokens = self.max_output_tokens;

        let registry = PipelineRegistry::new();
        let rag = registry.initialize(&config.workspace, &config.pipeline).await?;
        let result = rag.ask(options).await;
        registry.shutdown()?;
        let result = result?;

        if self.show_prompt {
            eprintln!("--- prompt ---\n{}\n--- end prompt ---", result.prompt);
        }

        if self.json {
            print_json(&result)?;
        } else {
            print_answer(&result);
        }

        Ok(())
    }

    /// The question text, rejected before any pipeline is built when blank.
    fn read_question(&self) -> AppResult<String> {
        let question = match (&self.question, &self.file) {
            (Some(question), _) => question.clone(),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                AppError::InvalidInput(format!("Failed to read question file {:?}: {}", path, e))
            })?,
            (None, None) => {
                return Err(AppError::InvalidInput(
                    "No question provided; pass it as an argument or with --file".to_string(),
                ))
            }
        };

        if question.trim().is_empty() {
            return Err(AppError::InvalidInput("question must not be empty".to_string()));
        }
        Ok(question)
    }
}

fn print_answer(result: &AnswerResult) {
    println!("{}", result.answer);
    println!();

    if result.contexts.is_empty() {
        println!("Sources: (none)");
    } else {
        println!("Sources:");
        for (n, (chunk, score)) in result.contexts.iter().zip(&result.scores).enumerate() {
            println!(
                "[Source {}] {} ({}, score {:.3})",
                n + 1,
                chunk.metadata.label(),
                chunk.id(),
                score
            );
        }
    }

    for warning in &result.warnings {
        eprintln!("warning: {}", warning);
    }
}
