//! Data models for a review session.
//!
//! This module contains the conversation history the agent builds up,
//! the tool calls requested by the model, and the user-facing locations
//! reported back by the tools.

use crate::error::ToolError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            args,
        }
    }

    /// Fetch a required string argument.
    pub fn str_arg(&self, name: &'static str) -> Result<&str, ToolError> {
        match self.args.get(name) {
            None | Some(Value::Null) => Err(ToolError::MissingArgument(name)),
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ToolError::InvalidArgument {
                name,
                reason: format!("expected a string, got {}", other),
            }),
        }
    }

    /// Fetch a required integer argument.
    ///
    /// Integral floats are accepted since some back-ends encode every
    /// number as a double.
    pub fn int_arg(&self, name: &'static str) -> Result<i64, ToolError> {
        let value = match self.args.get(name) {
            None | Some(Value::Null) => return Err(ToolError::MissingArgument(name)),
            Some(v) => v,
        };

        if let Some(n) = value.as_i64() {
            return Ok(n);
        }
        if let Some(f) = value.as_f64() {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                return Ok(f as i64);
            }
        }
        Err(ToolError::InvalidArgument {
            name,
            reason: format!("expected an integer, got {}", value),
        })
    }
}

/// Content of a single turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Text { text: String },
    ToolCalls { text: String, calls: Vec<ToolCall> },
    ToolResult { name: String, result: String },
}

/// One entry in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub payload: Payload,
}

/// Append-only conversation history owned by one session.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            payload: Payload::Text { text: text.into() },
        });
    }

    pub fn push_model_text(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::Model,
            payload: Payload::Text { text: text.into() },
        });
    }

    pub fn push_tool_calls(&mut self, text: impl Into<String>, calls: Vec<ToolCall>) {
        self.turns.push(Turn {
            role: Role::Model,
            payload: Payload::ToolCalls {
                text: text.into(),
                calls,
            },
        });
    }

    pub fn push_tool_result(&mut self, name: impl Into<String>, result: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::Tool,
            payload: Payload::ToolResult {
                name: name.into(),
                result: result.into(),
            },
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Where a symbol is defined. Line and column are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolLocation {
    /// Path relative to the project root.
    pub file_path: String,
    pub line: usize,
    pub character: usize,
}

impl fmt::Display for SymbolLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_path, self.line, self.character)
    }
}

/// A reference site reported to the model. Line and column are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceLocation {
    pub file_path: String,
    pub line: usize,
    pub character: usize,
}

impl fmt::Display for ReferenceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_path, self.line)
    }
}

/// Counters collected while the agent runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Model turns requested, including the final one.
    pub rounds: usize,
    /// Tool calls executed across all rounds.
    pub tool_calls: usize,
}

/// Final answer of a successful session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub review: String,
    pub stats: SessionStats,
}

/// Metadata about a review run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Project root that was reviewed.
    pub project: String,
    pub query: String,
    pub persona: String,
    pub model_used: String,
    pub review_date: DateTime<Utc>,
    pub rounds: usize,
    pub tool_calls: usize,
    pub duration_seconds: f64,
}

/// The complete review report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReport {
    pub metadata: ReportMetadata,
    /// Final answer of the model, usually Markdown.
    pub review: String,
}
