use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "ollamate",
    version,
    about = "Terminal chat client for local Ollama models with tool execution"
)]
pub struct Cli {
    /// Model to chat with (skips the selection prompt)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Ollama server URL, e.g. http://localhost:11434
    #[arg(short, long)]
    pub url: Option<String>,

    /// Working directory for file tools and @mentions
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Path to a system prompt file
    #[arg(short, long)]
    pub system_prompt: Option<String>,

    /// Enable session logging from the start
    #[arg(long)]
    pub log: bool,

    /// Skip confirmation prompts for destructive commands
    #[arg(long)]
    pub yolo: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from([
            "ollamate",
            "--model",
            "llama3",
            "--url",
            "http://10.0.0.2:11434",
            "--yolo",
        ]);
        assert_eq!(cli.model.as_deref(), Some("llama3"));
        assert_eq!(cli.url.as_deref(), Some("http://10.0.0.2:11434"));
        assert!(cli.yolo);
        assert!(!cli.log);
    }

    #[test]
    fn defaults_are_empty() {
        let cli = Cli::parse_from(["ollamate"]);
        assert!(cli.model.is_none());
        assert!(cli.directory.is_none());
        assert!(!cli.yolo);
    }
}
