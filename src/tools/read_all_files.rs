use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::list_files::glob_match;
use super::{resolve_path, ToolContext, ToolHandler};

#[derive(Deserialize)]
struct ReadAllFilesArgs {
    #[serde(default = "default_path")]
    path: String,
    glob: String,
    #[serde(default)]
    max_bytes: Option<usize>,
}

fn default_path() -> String {
    ".".to_string()
}

pub struct ReadAllFilesHandler;

#[async_trait]
impl ToolHandler for ReadAllFilesHandler {
    fn name(&self) -> &'static str {
        "read_all_files"
    }

    async fn handle(&self, ctx: &ToolContext<'_>, args: &Value) -> Result<String> {
        let parsed: ReadAllFilesArgs = serde_json::from_value(args.clone())
            .map_err(|err| anyhow!("invalid read_all_files arguments: {}", err))?;

        let base = resolve_path(ctx.working_directory, &parsed.path);
        if !base.is_dir() {
            return Err(anyhow!("Directory '{}' does not exist", parsed.path));
        }

        let names = glob_match(&base, &parsed.glob)?;
        if names.is_empty() {
            return Ok(format!(
                "No files found matching glob pattern '{}' in directory '{}'",
                parsed.glob, parsed.path
            ));
        }

        let mut out = String::new();
        for name in names {
            let full = base.join(&name);
            let content = match tokio::fs::read_to_string(&full).await {
                Ok(content) => content,
                // Binary or unreadable files are skipped, never fatal.
                Err(err) => {
                    ctx.logger.log(&format!("skipping unreadable '{name}': {err}"));
                    continue;
                }
            };
            out.push_str(&format!("---\nFile: {}\n---\n", name));
            out.push_str(&content);
            if !content.ends_with('\n') {
                out.push('\n');
            }
        }

        if let Some(max) = parsed.max_bytes {
            if out.len() > max {
                let mut cut = max;
                while cut > 0 && !out.is_char_boundary(cut) {
                    cut -= 1;
                }
                out.truncate(cut);
                out.push_str("\n... (truncated)");
            }
        }

        if out.is_empty() {
            return Ok(format!(
                "No readable files matching '{}' in '{}'",
                parsed.glob, parsed.path
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Logger;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn concatenates_matched_files_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta").unwrap();
        std::fs::write(dir.path().join("skip.rs"), "nope").unwrap();
        let logger = Logger::new();
        let ctx = ToolContext {
            working_directory: dir.path(),
            logger: &logger,
        };
        let out = ReadAllFilesHandler
            .handle(&ctx, &json!({"glob": "*.txt"}))
            .await
            .unwrap();
        assert_eq!(out, "---\nFile: a.txt\n---\nalpha\n---\nFile: b.txt\n---\nbeta\n");
    }

    #[tokio::test]
    async fn binary_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bin.dat"), [0u8, 159, 146, 150]).unwrap();
        std::fs::write(dir.path().join("ok.dat"), "fine").unwrap();
        let logger = Logger::new();
        let ctx = ToolContext {
            working_directory: dir.path(),
            logger: &logger,
        };
        let out = ReadAllFilesHandler
            .handle(&ctx, &json!({"glob": "*.dat"}))
            .await
            .unwrap();
        assert!(out.contains("File: ok.dat"));
        assert!(!out.contains("bin.dat"));
    }

    #[tokio::test]
    async fn max_bytes_truncates_the_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(500)).unwrap();
        let logger = Logger::new();
        let ctx = ToolContext {
            working_directory: dir.path(),
            logger: &logger,
        };
        let out = ReadAllFilesHandler
            .handle(&ctx, &json!({"glob": "*.txt", "max_bytes": 100}))
            .await
            .unwrap();
        assert!(out.ends_with("... (truncated)"));
        assert!(out.len() < 200);
    }

    #[tokio::test]
    async fn glob_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new();
        let ctx = ToolContext {
            working_directory: dir.path(),
            logger: &logger,
        };
        let err = ReadAllFilesHandler
            .handle(&ctx, &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid read_all_files arguments"));
    }

    #[tokio::test]
    async fn no_match_is_descriptive() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new();
        let ctx = ToolContext {
            working_directory: dir.path(),
            logger: &logger,
        };
        let out = ReadAllFilesHandler
            .handle(&ctx, &json!({"glob": "*.md"}))
            .await
            .unwrap();
        assert_eq!(
            out,
            "No files found matching glob pattern '*.md' in directory '.'"
        );
    }
}
