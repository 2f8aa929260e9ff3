use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{resolve_path, ToolContext, ToolHandler};

#[derive(Deserialize)]
struct ListFilesArgs {
    #[serde(default = "default_path")]
    path: String,
    #[serde(default)]
    glob: Option<String>,
}

fn default_path() -> String {
    ".".to_string()
}

pub struct ListFilesHandler;

#[async_trait]
impl ToolHandler for ListFilesHandler {
    fn name(&self) -> &'static str {
        "list_files"
    }

    async fn handle(&self, ctx: &ToolContext<'_>, args: &Value) -> Result<String> {
        let parsed: ListFilesArgs = serde_json::from_value(args.clone())
            .map_err(|err| anyhow!("invalid list_files arguments: {}", err))?;

        let base = resolve_path(ctx.working_directory, &parsed.path);
        if !base.is_dir() {
            return Err(anyhow!("Directory '{}' does not exist", parsed.path));
        }

        let names = match &parsed.glob {
            Some(pattern) => glob_match(&base, pattern)?,
            None => plain_listing(&base, &parsed.path)?,
        };

        if names.is_empty() {
            return Ok(match &parsed.glob {
                Some(pattern) => format!(
                    "No files found matching glob pattern '{}' in directory '{}'",
                    pattern, parsed.path
                ),
                None => format!("Directory '{}' is empty", parsed.path),
            });
        }
        Ok(format!("Files in '{}':\n{}", parsed.path, names.join("\n")))
    }
}

/// Non-recursive listing; subdirectories are marked with a trailing slash.
fn plain_listing(base: &std::path::Path, display_path: &str) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(base)
        .map_err(|err| anyhow!("Error reading directory '{}': {}", display_path, err))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|err| anyhow!("Error reading directory '{}': {}", display_path, err))?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Glob matching relative to `base`; `**` in the pattern recurses.
pub(super) fn glob_match(base: &std::path::Path, pattern: &str) -> Result<Vec<String>> {
    let full_pattern = format!("{}/{}", base.display(), pattern);
    let mut names = Vec::new();
    for entry in glob::glob(&full_pattern)
        .map_err(|err| anyhow!("Invalid glob pattern '{}': {}", pattern, err))?
    {
        let Ok(path) = entry else { continue };
        if !path.is_file() {
            continue;
        }
        names.push(
            path.strip_prefix(base)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned(),
        );
    }
    names.sort();
    Ok(names)
}
