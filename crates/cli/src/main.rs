//! MedRAG CLI
//!
//! Main entry point for the medrag command-line tool.
//! Builds the knowledge base from a transcription corpus and answers
//! questions grounded in it.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, IndexCommand, PreprocessCommand, PromptsCommand, StatsCommand};
use medrag_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;

/// MedRAG - question answering over medical transcriptions
#[derive(Parser, Debug)]
#[command(name = "medrag")]
#[command(about = "Retrieval-augmented question answering over medical transcriptions", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "MEDRAG_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "MEDRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk a transcription corpus into a chunk file
    Preprocess(PreprocessCommand),

    /// Embed a chunk file and persist the vector store
    Index(IndexCommand),

    /// Answer a question from the knowledge base
    Ask(AskCommand),

    /// Show vector store statistics
    Stats(StatsCommand),

    /// List available prompt definitions
    Prompts(PromptsCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load_from(cli.workspace, cli.config)?.with_overrides(
        None,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("MedRAG CLI starting");
    tracing::debug!(
        workspace = %config.workspace.display(),
        embedding = %config.pipeline.embedding.provider,
        generation = %config.pipeline.generation.provider,
        "Configuration loaded"
    );

    config.ensure_medrag_dir()?;

    let command_name = match &cli.command {
        Commands::Preprocess(_) => "preprocess",
        Commands::Index(_) => "index",
        Commands::Ask(_) => "ask",
        Commands::Stats(_) => "stats",
        Commands::Prompts(_) => "prompts",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Preprocess(cmd) => cmd.execute(&config),
        Commands::Index(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Stats(cmd) => cmd.execute(&config).await,
        Commands::Prompts(cmd) => cmd.execute(&config),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
