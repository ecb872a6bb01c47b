//! LLM agent modules for code review.
//!
//! This module provides the tool-calling review loop, the tools it can
//! call and the model back-ends it talks to.

pub mod agent_loop;
pub mod backend;
pub mod gemini;
pub mod retry;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use agent_loop::{AgentConfig, LoopState, ReviewAgent};
pub use backend::ModelBackend;
pub use gemini::GeminiBackend;
pub use retry::RetryPolicy;
pub use tools::ToolDispatcher;
