// source.rs — kernel source loader.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
#[error("cannot read kernel source {}: {source}", path.display())]
pub struct SourceError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Reads kernel source text from a fixed path. The file is re-read on every
/// call so edits are picked up by the next reload.
#[derive(Debug, Clone)]
pub struct SourceLoader {
    path: PathBuf,
}

impl SourceLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SourceLoader { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<String, SourceError> {
        fs::read_to_string(&self.path).map_err(|source| SourceError {
            path: self.path.clone(),
            source,
        })
    }
}
