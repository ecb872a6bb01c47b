//! Symbol definition lookup over parsed Go sources.
//!
//! This module walks the project, parses every non-test `.go` file with
//! tree-sitter and reports declarations whose name matches exactly.

use crate::config::SymbolsConfig;
use crate::error::ToolError;
use crate::models::SymbolLocation;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tree_sitter::{Node, Parser};
use walkdir::WalkDir;

/// Finds where a symbol is defined.
pub trait SymbolResolver: Send + Sync {
    /// An empty list means the name is not defined anywhere.
    fn find_symbol(&self, name: &str) -> Result<Vec<SymbolLocation>, ToolError>;
}

/// Resolver backed by the tree-sitter Go grammar.
pub struct AstSymbolResolver {
    root: PathBuf,
    excludes: Vec<String>,
}

impl AstSymbolResolver {
    pub fn new(root: PathBuf, config: &SymbolsConfig) -> Self {
        Self {
            root,
            excludes: config.excludes.clone(),
        }
    }

    fn is_excluded_dir(&self, name: &str) -> bool {
        self.excludes.iter().any(|pattern| pattern == name)
    }

    fn is_candidate(path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        file_name.ends_with(".go") && !file_name.ends_with("_test.go")
    }
}

impl SymbolResolver for AstSymbolResolver {
    fn find_symbol(&self, name: &str) -> Result<Vec<SymbolLocation>, ToolError> {
        let language: tree_sitter::Language = tree_sitter_go::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| ToolError::Parse(format!("failed to set language: {}", e)))?;

        let mut results = Vec::new();

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self.is_excluded_dir(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() || !Self::is_candidate(path) {
                continue;
            }

            let source = match std::fs::read(path) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };

            let Some(tree) = parser.parse(&source, None) else {
                continue;
            };

            let rel_path = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();

            collect_declarations(tree.root_node(), &source, name, &rel_path, &mut results);
        }

        debug!("find_symbol({}) -> {} match(es)", name, results.len());
        Ok(results)
    }
}

/// Walk the tree, recording function, method, type and var/const names.
fn collect_declarations(
    node: Node,
    source: &[u8],
    name: &str,
    file: &str,
    results: &mut Vec<SymbolLocation>,
) {
    match node.kind() {
        "function_declaration" | "method_declaration" | "type_spec" | "type_alias" => {
            if let Some(ident) = node.child_by_field_name("name") {
                push_if_named(ident, source, name, file, results);
            }
        }
        "var_spec" | "const_spec" => {
            let mut cursor = node.walk();
            for child in node.children_by_field_name("name", &mut cursor) {
                push_if_named(child, source, name, file, results);
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_declarations(child, source, name, file, results);
    }
}

fn push_if_named(
    ident: Node,
    source: &[u8],
    name: &str,
    file: &str,
    results: &mut Vec<SymbolLocation>,
) {
    if node_text(&ident, source) == name {
        let pos = ident.start_position();
        results.push(SymbolLocation {
            file_path: file.to_string(),
            line: pos.row + 1,
            character: pos.column + 1,
        });
    }
}

fn node_text<'a>(node: &Node, source: &'a [u8]) -> &'a str {
    source
        .get(node.start_byte()..node.end_byte())
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .unwrap_or("")
}
