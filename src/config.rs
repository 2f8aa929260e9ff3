use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful assistant with access to tools.

Always reply with a single JSON object of this shape:
{"version": "1.0", "thoughts": ["short reasoning"], "action": {"tool": "<name>", "input": {...}}}

Available tools:
- read_file: {"path": "file.txt"} - read one file
- list_files: {"path": ".", "glob": "*.rs"} - list a directory (glob optional)
- read_all_files: {"path": ".", "glob": "*.rs"} - read every matching file
- write_file: {"path": "file.txt", "content": "...", "mode": "overwrite" or "create_only"} - write a file
- append_file: {"path": "file.txt", "content": "..."} - append to a file
- delete_file: {"path": "file.txt"} - delete a file
- git: {"cmd": "log", "args": ["-n", "1"]} - run a git subcommand
- web_search: {"query": "..."} - search the web
- visit_url: {"url": "https://..."} - fetch a page as text
- respond: {"message": "..."} - give your final answer to the user

Use respond when you have the answer. Use exactly one action per reply.
"#;

fn default_server_url() -> String {
    "http://localhost".to_string()
}

fn default_server_port() -> u16 {
    11434
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_path: Option<String>,
    #[serde(default)]
    pub log_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            server_port: default_server_port(),
            default_model: None,
            system_prompt_path: None,
            log_enabled: false,
        }
    }
}

impl Config {
    /// Get the path to the config file (~/.ollamate/config.toml)
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".ollamate").join("config.toml"))
    }

    /// Load config from file, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            bail!("server_url must not be empty");
        }
        if self.server_port == 0 {
            bail!("server_port must be greater than zero");
        }
        Ok(())
    }

    /// Base URL of the Ollama server, e.g. "http://localhost:11434".
    pub fn base_url(&self) -> String {
        format!("{}:{}", self.server_url.trim_end_matches('/'), self.server_port)
    }

    /// Resolve the system prompt: an explicit path override wins, then the
    /// configured path, then a Prompt.md in the working directory, then the
    /// built-in default.
    pub fn system_prompt(&self, override_path: Option<&str>) -> String {
        let candidates = [
            override_path,
            self.system_prompt_path.as_deref(),
            Some("Prompt.md"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Ok(content) = fs::read_to_string(candidate) {
                if !content.trim().is_empty() {
                    return content;
                }
            }
        }
        DEFAULT_SYSTEM_PROMPT.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_ollama() {
        let config = Config::default();
        assert_eq!(config.base_url(), "http://localhost:11434");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn base_url_trims_trailing_slash() {
        let config = Config {
            server_url: "http://10.0.0.2/".to_string(),
            server_port: 8080,
            ..Config::default()
        };
        assert_eq!(config.base_url(), "http://10.0.0.2:8080");
    }

    #[test]
    fn zero_port_is_rejected() {
        let config = Config {
            server_port: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str("default_model = \"llama3\"").unwrap();
        assert_eq!(config.server_port, 11434);
        assert_eq!(config.default_model.as_deref(), Some("llama3"));
        assert!(!config.log_enabled);
    }

    #[test]
    fn system_prompt_falls_back_to_builtin() {
        let config = Config::default();
        let prompt = config.system_prompt(Some("/nonexistent/prompt.md"));
        assert!(prompt.contains("respond"));
    }
}
