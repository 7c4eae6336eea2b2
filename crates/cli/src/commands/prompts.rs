//! Prompt listing.

use crate::commands::print_json;
use clap::Args;
use medrag_core::{config::AppConfig, AppResult};
use medrag_prompt::{list_prompts, resolve_prompt};

/// List available prompt definitions
#[derive(Args, Debug)]
pub struct PromptsCommand {
    /// Print the template of one prompt instead of the list
    #[arg(long)]
    pub show: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl PromptsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        if let Some(id) = &self.show {
            let definition = resolve_prompt(&config.workspace, id)?;
            if self.json {
                print_json(&definition)?;
            } else {
                println!("{} ({}, apiVersion {})", definition.id, definition.title, definition.api_version);
                println!();
                println!("{}", definition.template);
            }
            return Ok(());
        }

        let ids = list_prompts(&config.workspace)?;
        let active = &config.pipeline.prompt.prompt_id;

        if self.json {
            print_json(&serde_json::json!({ "active": active, "prompts": ids }))?;
        } else {
            for id in &ids {
                let marker = if id == active { "*" } else { " " };
                println!("{} {}", marker, id);
            }
        }

        Ok(())
    }
}
