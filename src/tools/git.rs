use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use super::{resolve_path, ToolContext, ToolHandler};

const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_BYTES: usize = 16_384;

#[derive(Deserialize)]
struct GitArgs {
    cmd: String,
    #[serde(default)]
    args: Value,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    max_bytes: Option<usize>,
}

pub struct GitHandler;

#[async_trait]
impl ToolHandler for GitHandler {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn handle(&self, ctx: &ToolContext<'_>, args: &Value) -> Result<String> {
        let parsed: GitArgs = serde_json::from_value(args.clone())
            .map_err(|err| anyhow!("invalid git arguments: {}", err))?;

        if parsed.cmd.trim().is_empty() {
            return Err(anyhow!("git requires a 'cmd' argument"));
        }

        let mut argv = vec![parsed.cmd.clone()];
        argv.extend(coerce_args(&parsed.args));

        let cwd = match &parsed.cwd {
            Some(dir) => resolve_path(ctx.working_directory, dir),
            None => ctx.working_directory.to_path_buf(),
        };
        let timeout = Duration::from_millis(parsed.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
        let max_bytes = parsed.max_bytes.unwrap_or(DEFAULT_MAX_BYTES);
        run_with_timeout("git", &argv, &cwd, timeout, max_bytes).await
    }
}

/// Accepts the args field as a proper array, a single string, or nothing.
fn coerce_args(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Runs a command with a wall-clock timeout. The child gets a null stdin so
/// prompts (credentials, pagers) fail fast instead of hanging, and is killed
/// when the timeout fires.
pub(crate) async fn run_with_timeout(
    program: &str,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
    max_bytes: usize,
) -> Result<String> {
    let future = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, future).await {
        Ok(result) => result.map_err(|err| anyhow!("Error running {}: {}", program, err))?,
        Err(_) => {
            return Err(anyhow!(
                "Command timed out after {}ms: {} {}",
                timeout.as_millis(),
                program,
                args.join(" ")
            ))
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        return Err(anyhow!(
            "{} {} failed ({}): {}",
            program,
            args.join(" "),
            output.status,
            stderr.trim()
        ));
    }

    let mut text = stdout.into_owned();
    if text.len() > max_bytes {
        let mut cut = max_bytes;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("\n... (output truncated)");
    }
    if text.trim().is_empty() {
        text = "(no output)".to_string();
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_args_handles_all_shapes() {
        assert_eq!(
            coerce_args(&serde_json::json!(["-n", "1"])),
            vec!["-n", "1"]
        );
        assert_eq!(coerce_args(&serde_json::json!("-n 1")), vec!["-n", "1"]);
        assert!(coerce_args(&serde_json::json!(null)).is_empty());
        assert!(coerce_args(&serde_json::json!(42)).is_empty());
    }

    #[tokio::test]
    async fn timeout_kills_a_hung_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_with_timeout(
            "sleep",
            &["5".to_string()],
            dir.path(),
            Duration::from_millis(100),
            DEFAULT_MAX_BYTES,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("timed out after 100ms"));
    }

    #[tokio::test]
    async fn captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_with_timeout(
            "echo",
            &["hello".to_string()],
            dir.path(),
            Duration::from_secs(5),
            DEFAULT_MAX_BYTES,
        )
        .await
        .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_with_timeout(
            "git",
            &["definitely-not-a-subcommand".to_string()],
            dir.path(),
            Duration::from_secs(5),
            DEFAULT_MAX_BYTES,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("failed"));
    }

    #[tokio::test]
    async fn long_output_is_truncated_at_max_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_with_timeout(
            "echo",
            &["a".repeat(100)],
            dir.path(),
            Duration::from_secs(5),
            10,
        )
        .await
        .unwrap();
        assert!(out.ends_with("... (output truncated)"));
        assert!(out.starts_with("aaaaaaaaaa"));
    }

    #[tokio::test]
    async fn empty_cmd_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let logger = crate::logger::Logger::new();
        let ctx = ToolContext {
            working_directory: dir.path(),
            logger: &logger,
        };
        let err = GitHandler
            .handle(&ctx, &serde_json::json!({"cmd": "  "}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires a 'cmd'"));
    }
}
