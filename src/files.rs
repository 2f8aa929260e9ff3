//! Index of file names in the working directory, used to resolve @mentions
//! and kept fresh after tool calls that touch the filesystem.

use std::path::{Path, PathBuf};

use anyhow::Result;

pub struct FileIndex {
    dir: PathBuf,
    names: Vec<String>,
}

impl FileIndex {
    pub fn new(dir: &Path) -> Result<Self> {
        let mut index = Self {
            dir: dir.to_path_buf(),
            names: Vec::new(),
        };
        index.refresh()?;
        Ok(index)
    }

    /// Re-scans the directory. Only regular files at the top level are
    /// indexed; subdirectories are reachable through the tools instead.
    pub fn refresh(&mut self) -> Result<()> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        self.names = names;
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Case-insensitive substring match, first hit wins in sorted order.
    pub fn find(&self, term: &str) -> Option<&str> {
        let needle = term.to_lowercase();
        self.names
            .iter()
            .find(|name| name.to_lowercase().contains(&needle))
            .map(String::as_str)
    }
}
