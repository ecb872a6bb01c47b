//! Working-tree diff through libgit2.

use crate::error::ToolError;
use crate::workspace::DiffProvider;
use git2::{DiffFormat, DiffOptions, Repository};
use std::path::PathBuf;
use tracing::debug;

/// Equivalent of `git diff HEAD` for the repository containing `root`.
pub struct GitDiff {
    root: PathBuf,
}

impl GitDiff {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl DiffProvider for GitDiff {
    fn diff(&self) -> Result<String, ToolError> {
        let repo = Repository::discover(&self.root)?;

        // No commits yet: diff against the empty tree.
        let head_tree = match repo.head() {
            Ok(head) => Some(head.peel_to_tree()?),
            Err(e) => {
                debug!("No HEAD to diff against: {}", e);
                None
            }
        };

        let mut opts = DiffOptions::new();
        opts.include_untracked(false);
        let diff = repo.diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))?;

        let mut patch = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                patch.push(line.origin());
            }
            patch.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;

        Ok(patch)
    }
}
