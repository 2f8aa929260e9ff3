mod chat;
mod cli;
mod config;
mod extract;
mod files;
mod logger;
mod ollama;
mod permissions;
mod protocol;
mod tools;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dialoguer::{theme::ColorfulTheme, Select};

use crate::chat::ChatSession;
use crate::cli::Cli;
use crate::config::Config;
use crate::logger::Logger;
use crate::ollama::OllamaClient;
use crate::permissions::PermissionGate;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    config.validate()?;

    let base_url = cli
        .url
        .clone()
        .unwrap_or_else(|| config.base_url());

    let logger = Arc::new(Logger::new());
    if cli.log || config.log_enabled {
        println!("{}", logger.enable());
    }

    let client = OllamaClient::new(base_url, Arc::clone(&logger))?;

    let models = client.list_models().await?;
    if models.is_empty() {
        bail!("No models available on the server. Pull one with `ollama pull <model>` first.");
    }

    let model = match cli.model.clone().or_else(|| config.default_model.clone()) {
        Some(name) => {
            if !models.contains(&name) {
                bail!(
                    "Model '{}' is not available. Installed models: {}",
                    name,
                    models.join(", ")
                );
            }
            name
        }
        None => pick_model(&models)?,
    };

    let context_window = match client.show_model(&model).await {
        Ok(info) => match ollama::context_length(&info) {
            Ok(n) => n,
            Err(_) => {
                eprintln!("Warning: could not determine context window for {model}; using the server default.");
                0
            }
        },
        Err(e) => {
            eprintln!("Warning: could not query model info ({e}); using the server default context window.");
            0
        }
    };

    let working_directory = match cli.directory {
        Some(dir) => dir
            .canonicalize()
            .with_context(|| format!("Invalid working directory: {}", dir.display()))?,
        None => std::env::current_dir().context("Could not determine current directory")?,
    };

    let system_prompt = config.system_prompt(cli.system_prompt.as_deref());
    let gate = PermissionGate::new(cli.yolo);

    let mut session = ChatSession::new(
        client,
        model,
        context_window,
        system_prompt,
        working_directory,
        gate,
        logger,
    )?;
    session.run().await
}

fn pick_model(models: &[String]) -> Result<String> {
    let index = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a model")
        .items(models)
        .default(0)
        .interact()
        .context("Model selection aborted")?;
    Ok(models[index].clone())
}
