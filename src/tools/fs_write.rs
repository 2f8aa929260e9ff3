//! Destructive file tools. These are the handlers behind the permission
//! prompt; every one reports `mutates_files` so the caller can refresh its
//! file index afterwards.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use super::{resolve_path, ToolContext, ToolHandler};

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    mode: WriteMode,
}

#[derive(Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
enum WriteMode {
    #[default]
    Overwrite,
    CreateOnly,
}

#[derive(Deserialize)]
struct PathArgs {
    path: String,
}

pub struct WriteFileHandler;

#[async_trait]
impl ToolHandler for WriteFileHandler {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn mutates_files(&self) -> bool {
        true
    }

    async fn handle(&self, ctx: &ToolContext<'_>, args: &Value) -> Result<String> {
        let parsed: WriteArgs = serde_json::from_value(args.clone())
            .map_err(|err| anyhow!("invalid write_file arguments: {}", err))?;

        let full_path = resolve_path(ctx.working_directory, &parsed.path);
        if parsed.mode == WriteMode::CreateOnly && full_path.exists() {
            return Err(anyhow!("File '{}' already exists", parsed.path));
        }
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| anyhow!("Error creating directory for '{}': {}", parsed.path, err))?;
        }
        tokio::fs::write(&full_path, &parsed.content)
            .await
            .map_err(|err| anyhow!("Error writing file '{}': {}", parsed.path, err))?;
        Ok(format!("File '{}' created successfully.", parsed.path))
    }
}

pub struct AppendFileHandler;

#[async_trait]
impl ToolHandler for AppendFileHandler {
    fn name(&self) -> &'static str {
        "append_file"
    }

    fn mutates_files(&self) -> bool {
        true
    }

    async fn handle(&self, ctx: &ToolContext<'_>, args: &Value) -> Result<String> {
        let parsed: WriteArgs = serde_json::from_value(args.clone())
            .map_err(|err| anyhow!("invalid append_file arguments: {}", err))?;

        let full_path = resolve_path(ctx.working_directory, &parsed.path);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full_path)
            .await
            .map_err(|err| anyhow!("Error opening file '{}': {}", parsed.path, err))?;
        file.write_all(parsed.content.as_bytes())
            .await
            .map_err(|err| anyhow!("Error appending to file '{}': {}", parsed.path, err))?;
        Ok(format!("Content appended to '{}' successfully.", parsed.path))
    }
}

pub struct DeleteFileHandler;

#[async_trait]
impl ToolHandler for DeleteFileHandler {
    fn name(&self) -> &'static str {
        "delete_file"
    }

    fn mutates_files(&self) -> bool {
        true
    }

    async fn handle(&self, ctx: &ToolContext<'_>, args: &Value) -> Result<String> {
        let parsed: PathArgs = serde_json::from_value(args.clone())
            .map_err(|err| anyhow!("invalid delete_file arguments: {}", err))?;

        let full_path = resolve_path(ctx.working_directory, &parsed.path);
        tokio::fs::remove_file(&full_path)
            .await
            .map_err(|err| anyhow!("Error deleting file '{}': {}", parsed.path, err))?;
        Ok(format!("File '{}' deleted successfully.", parsed.path))
    }
}
