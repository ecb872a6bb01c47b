//! Model back-end contract.
//!
//! The agent loop only talks to this trait; the Gemini client in
//! `gemini.rs` is the production implementation.

use crate::agent::tools::ToolDefinition;
use crate::error::BackendError;
use crate::models::{Conversation, ToolCall};
use async_trait::async_trait;

/// Everything the back-end needs for one turn.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub system_instruction: &'a str,
    pub conversation: &'a Conversation,
    pub tools: &'a [ToolDefinition],
}

/// One model response: free text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub text: String,
    /// In the order the model emitted them.
    pub tool_calls: Vec<ToolCall>,
}

#[cfg(test)]
impl ModelTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: String::new(),
            tool_calls,
        }
    }
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Name of the model, for reports.
    fn model_name(&self) -> &str;

    /// Request the next turn. Throttling must surface as
    /// [`BackendError::RateLimited`] so the caller can retry.
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<ModelTurn, BackendError>;
}
