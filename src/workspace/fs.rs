//! Filesystem reader confined to the project root.

use crate::error::ToolError;
use crate::workspace::FileReader;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Reads files under `root`, refusing anything outside it.
pub struct FsReader {
    root: PathBuf,
}

impl FsReader {
    pub fn new(root: PathBuf) -> Self {
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    /// Resolve `relative_path` against the root without touching the disk.
    fn resolve(&self, relative_path: &str) -> Result<PathBuf, ToolError> {
        let requested = Path::new(relative_path);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.root.join(requested)
        };

        let normalized = normalize(&joined);
        if !normalized.starts_with(&self.root) {
            return Err(ToolError::OutsideRoot(relative_path.to_string()));
        }
        Ok(normalized)
    }
}

impl FileReader for FsReader {
    fn read(&self, relative_path: &str) -> Result<String, ToolError> {
        let path = self.resolve(relative_path)?;

        // Symlinks can still point outside after lexical normalisation.
        let canonical = std::fs::canonicalize(&path).map_err(|source| ToolError::Io {
            path: PathBuf::from(relative_path),
            source,
        })?;
        if !canonical.starts_with(&self.root) {
            return Err(ToolError::OutsideRoot(relative_path.to_string()));
        }

        debug!("Reading {}", canonical.display());
        std::fs::read_to_string(&canonical).map_err(|source| ToolError::Io {
            path: PathBuf::from(relative_path),
            source,
        })
    }
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
