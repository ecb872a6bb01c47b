//! Tool definitions for the review agent.
//!
//! This module defines the four tools the model can call to inspect the
//! project under review, and the dispatcher that executes them.

use crate::error::ToolError;
use crate::lsp::{CodeAnalyzer, FileLocation, Position};
use crate::models::{ReferenceLocation, ToolCall};
use crate::symbols::SymbolResolver;
use crate::workspace::{DiffProvider, FileReader};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const FIND_REFERENCES: &str = "find-references";
pub const READ_FILE: &str = "read-file";
pub const GET_DIFF: &str = "get-diff";
pub const FIND_SYMBOL: &str = "find-symbol";

pub const NO_REFERENCES: &str = "No references found.";
pub const CLEAN_WORKING_TREE: &str = "No changes detected (working tree is clean).";

/// Tool definition handed to the model back-end.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// Result of executing a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message),
        }
    }

    /// Text fed back to the model. Failures become `Error: <msg>`.
    pub fn into_text(self) -> String {
        if self.success {
            self.output
        } else {
            format!("Error: {}", self.error.unwrap_or_default())
        }
    }
}

/// Executes tool calls against the project's collaborators.
pub struct ToolDispatcher<'a> {
    root: PathBuf,
    analyzer: &'a dyn CodeAnalyzer,
    reader: &'a dyn FileReader,
    differ: &'a dyn DiffProvider,
    resolver: &'a dyn SymbolResolver,
}

impl<'a> ToolDispatcher<'a> {
    /// `root` must match the root the language server was started with.
    pub fn new(
        root: PathBuf,
        analyzer: &'a dyn CodeAnalyzer,
        reader: &'a dyn FileReader,
        differ: &'a dyn DiffProvider,
        resolver: &'a dyn SymbolResolver,
    ) -> Self {
        Self {
            root,
            analyzer,
            reader,
            differ,
            resolver,
        }
    }

    /// Execute a tool call. Never fails; errors are carried in the result.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        info!("Tool: {}({})", call.name, summarize_args(call));

        match self.dispatch(call).await {
            Ok(output) => ToolResult::success(output),
            Err(e) => {
                debug!("Tool {} failed: {}", call.name, e);
                ToolResult::error(e.to_string())
            }
        }
    }

    async fn dispatch(&self, call: &ToolCall) -> Result<String, ToolError> {
        match call.name.as_str() {
            FIND_REFERENCES => self.find_references(call).await,
            READ_FILE => self.reader.read(call.str_arg("file_path")?),
            GET_DIFF => self.get_diff(),
            FIND_SYMBOL => self.find_symbol(call),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    async fn find_references(&self, call: &ToolCall) -> Result<String, ToolError> {
        let file_path = call.str_arg("file_path")?;
        let position = to_wire_position(call.int_arg("line")?, call.int_arg("character")?)?;

        let file = self.root.join(file_path);
        let locations = self.analyzer.references(&file, position).await?;

        if locations.is_empty() {
            return Ok(NO_REFERENCES.to_string());
        }

        Ok(locations
            .iter()
            .map(|loc| to_reference_location(loc, &self.root).to_string())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn get_diff(&self) -> Result<String, ToolError> {
        let diff = self.differ.diff()?;
        if diff.trim().is_empty() {
            Ok(CLEAN_WORKING_TREE.to_string())
        } else {
            Ok(diff)
        }
    }

    fn find_symbol(&self, call: &ToolCall) -> Result<String, ToolError> {
        let name = call.str_arg("name")?;
        let found = self.resolver.find_symbol(name)?;

        if found.is_empty() {
            return Ok(format!("Symbol {:?} not found.", name));
        }

        Ok(found
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Convert 1-based user coordinates to a 0-based wire position.
pub fn to_wire_position(line: i64, character: i64) -> Result<Position, ToolError> {
    let convert = |name: &'static str, value: i64| -> Result<u32, ToolError> {
        if value < 1 {
            return Err(ToolError::InvalidArgument {
                name,
                reason: format!("must be at least 1, got {}", value),
            });
        }
        u32::try_from(value - 1).map_err(|_| ToolError::InvalidArgument {
            name,
            reason: format!("out of range: {}", value),
        })
    };

    Ok(Position {
        line: convert("line", line)?,
        character: convert("character", character)?,
    })
}

/// Convert a 0-based server location to a 1-based, root-relative one.
pub fn to_reference_location(location: &FileLocation, root: &Path) -> ReferenceLocation {
    let file_path = location
        .path
        .strip_prefix(root)
        .unwrap_or(&location.path)
        .to_string_lossy()
        .to_string();

    ReferenceLocation {
        file_path,
        line: location.start.line as usize + 1,
        character: location.start.character as usize + 1,
    }
}

fn summarize_args(call: &ToolCall) -> String {
    call.args
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{}={}", k, s),
            other => format!("{}={}", k, other),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Get all tool definitions for the model.
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: FIND_REFERENCES.to_string(),
                description: "Find all references to the symbol at a position. Line and character are 1-based. Returns one path:line per reference.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "File path relative to the project root"
                        },
                        "line": {
                            "type": "integer",
                            "description": "1-based line of the symbol"
                        },
                        "character": {
                            "type": "integer",
                            "description": "1-based column of the symbol"
                        }
                    },
                    "required": ["file_path", "line", "character"]
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: READ_FILE.to_string(),
                description: "Read the full contents of a file in the project.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "File path relative to the project root"
                        }
                    },
                    "required": ["file_path"]
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: GET_DIFF.to_string(),
                description: "Show uncommitted changes in the working tree as a unified diff.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: FIND_SYMBOL.to_string(),
                description: "Find where a function, method, type, variable or constant is defined. Returns path:line:character per definition.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "name": {
                            "type": "string",
                            "description": "Exact name of the symbol"
                        }
                    },
                    "required": ["name"]
                }),
            },
        },
    ]
}
