use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{resolve_path, ToolContext, ToolHandler};

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
}

pub struct ReadFileHandler;

#[async_trait]
impl ToolHandler for ReadFileHandler {
    fn name(&self) -> &'static str {
        "read_file"
    }

    async fn handle(&self, ctx: &ToolContext<'_>, args: &Value) -> Result<String> {
        let parsed: ReadFileArgs = serde_json::from_value(args.clone())
            .map_err(|err| anyhow!("invalid read_file arguments: {}", err))?;

        let full_path = resolve_path(ctx.working_directory, &parsed.path);
        tokio::fs::read_to_string(&full_path)
            .await
            .map_err(|err| anyhow!("Error reading file '{}': {}", parsed.path, err))
    }
}
