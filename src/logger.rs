//! Optional session logging to a file next to the executable.
//!
//! Logging is best-effort: a failed write never disturbs the chat loop.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;

pub struct Logger {
    inner: Mutex<Inner>,
}

struct Inner {
    enabled: bool,
    file: Option<File>,
}

impl Logger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                enabled: false,
                file: None,
            }),
        }
    }

    pub fn enabled(&self) -> bool {
        match self.inner.lock() {
            Ok(inner) => inner.enabled,
            Err(_) => false,
        }
    }

    /// Appends a timestamped line when logging is on. Errors are swallowed.
    pub fn log(&self, message: &str) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if !inner.enabled {
            return;
        }
        if let Some(file) = inner.file.as_mut() {
            let _ = writeln!(
                file,
                "[{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                message
            );
        }
    }

    /// Turns logging on or off, opening the log file on demand.
    /// Returns a human-readable status line for the REPL.
    pub fn toggle(&self) -> String {
        let Ok(mut inner) = self.inner.lock() else {
            return "Logging unavailable.".to_string();
        };
        if inner.enabled {
            inner.enabled = false;
            return "Logging disabled.".to_string();
        }
        match open_log_file() {
            Ok((file, path)) => {
                inner.file = Some(file);
                inner.enabled = true;
                format!("Logging enabled: {}", path.display())
            }
            Err(e) => format!("Could not open log file: {e}"),
        }
    }

    /// Enables logging at startup, reporting failures without aborting.
    pub fn enable(&self) -> String {
        if self.enabled() {
            return "Logging already enabled.".to_string();
        }
        self.toggle()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

fn open_log_file() -> std::io::Result<(File, PathBuf)> {
    let base = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));
    let dir = base.join("logs");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("log.txt");
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((file, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disabled_and_drops_messages_silently() {
        let logger = Logger::new();
        assert!(!logger.enabled());
        logger.log("no destination yet");
    }

    #[test]
    fn toggle_flips_state() {
        let logger = Logger::new();
        let first = logger.toggle();
        if logger.enabled() {
            assert!(first.starts_with("Logging enabled"));
            assert_eq!(logger.toggle(), "Logging disabled.");
            assert!(!logger.enabled());
        } else {
            // Sandboxed environments may forbid writing next to the binary.
            assert!(first.starts_with("Could not open log file"));
        }
    }
}
