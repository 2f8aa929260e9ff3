use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::logger::Logger;

mod fs_write;
mod git;
mod list_files;
mod read_all_files;
mod read_file;
mod web;

pub use fs_write::{AppendFileHandler, DeleteFileHandler, WriteFileHandler};
pub use git::GitHandler;
pub use list_files::ListFilesHandler;
pub use read_all_files::ReadAllFilesHandler;
pub use read_file::ReadFileHandler;
pub use web::{VisitUrlHandler, WebSearchHandler};

pub struct ToolContext<'a> {
    pub working_directory: &'a Path,
    pub logger: &'a Logger,
}

/// Result of one dispatched tool call. `mutated_files` tells the caller
/// to refresh its view of the working directory.
pub struct ToolOutcome {
    pub text: String,
    pub mutated_files: bool,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a successful call may change files in the working directory.
    fn mutates_files(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &ToolContext<'_>, args: &Value) -> Result<String>;
}

pub struct ToolRegistry {
    handlers: HashMap<&'static str, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register(Arc::new(ReadFileHandler));
        registry.register(Arc::new(ReadAllFilesHandler));
        registry.register(Arc::new(ListFilesHandler));
        registry.register(Arc::new(WriteFileHandler));
        registry.register(Arc::new(AppendFileHandler));
        registry.register(Arc::new(DeleteFileHandler));
        registry.register(Arc::new(GitHandler));
        registry.register(Arc::new(WebSearchHandler));
        registry.register(Arc::new(VisitUrlHandler));
        registry
    }

    fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    /// Runs one tool call. Never returns an error: failures become
    /// descriptive text so the model can see what went wrong and retry.
    pub async fn dispatch(&self, tool: &str, ctx: &ToolContext<'_>, args: &Value) -> ToolOutcome {
        if tool.is_empty() {
            return ToolOutcome {
                text: String::new(),
                mutated_files: false,
            };
        }
        let Some(handler) = self.handlers.get(tool) else {
            return ToolOutcome {
                text: format!("Unknown command: {tool}"),
                mutated_files: false,
            };
        };
        ctx.logger.log(&format!("tool call: {tool} {args}"));
        match handler.handle(ctx, args).await {
            Ok(text) => ToolOutcome {
                text,
                mutated_files: handler.mutates_files(),
            },
            Err(e) => ToolOutcome {
                text: format!("{e:#}"),
                mutated_files: false,
            },
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves a user-supplied path against the working directory. Absolute
/// paths pass through unchanged.
pub(crate) fn resolve_path(base: &Path, user_path: &str) -> PathBuf {
    let candidate = Path::new(user_path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(dir: &'a Path, logger: &'a Logger) -> ToolContext<'a> {
        ToolContext {
            working_directory: dir,
            logger,
        }
    }

    #[tokio::test]
    async fn unknown_tool_reports_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new();
        let registry = ToolRegistry::new();
        let outcome = registry
            .dispatch("teleport", &ctx(dir.path(), &logger), &json!({}))
            .await;
        assert_eq!(outcome.text, "Unknown command: teleport");
        assert!(!outcome.mutated_files);
    }

    #[tokio::test]
    async fn empty_tool_name_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new();
        let registry = ToolRegistry::new();
        let outcome = registry
            .dispatch("", &ctx(dir.path(), &logger), &json!({}))
            .await;
        assert!(outcome.text.is_empty());
    }

    #[tokio::test]
    async fn handler_errors_become_text() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::new();
        let registry = ToolRegistry::new();
        let outcome = registry
            .dispatch(
                "read_file",
                &ctx(dir.path(), &logger),
                &json!({"path": "missing.txt"}),
            )
            .await;
        assert!(outcome.text.contains("missing.txt"));
        assert!(!outcome.mutated_files);
    }

    #[test]
    fn resolve_path_keeps_absolute_paths() {
        let base = Path::new("/work");
        assert_eq!(resolve_path(base, "/etc/hosts"), PathBuf::from("/etc/hosts"));
        assert_eq!(resolve_path(base, "a.txt"), PathBuf::from("/work/a.txt"));
    }
}
