//! Project workspace access: file contents and working-tree diffs.

pub mod fs;
pub mod git;

use crate::error::ToolError;

pub use fs::FsReader;
pub use git::GitDiff;

/// Reads files relative to the project root.
pub trait FileReader: Send + Sync {
    /// Must reject any path that leaves the project root.
    fn read(&self, relative_path: &str) -> Result<String, ToolError>;
}

/// Produces the working-tree diff against `HEAD`.
pub trait DiffProvider: Send + Sync {
    /// An empty string means there are no changes.
    fn diff(&self) -> Result<String, ToolError>;
}
