//! Agent loop for tool-based code review.
//!
//! The model is asked for a turn; any tool calls it makes are executed
//! and their results appended to the conversation, and the cycle repeats
//! until the model answers in plain text or the round budget runs out.

use crate::agent::backend::{GenerateRequest, ModelBackend, ModelTurn};
use crate::agent::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::agent::tools::{get_tool_definitions, ToolDefinition, ToolDispatcher, ToolResult};
use crate::error::{AgentError, BackendError};
use crate::models::{Conversation, ReviewOutcome, SessionStats, ToolCall};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// Appended once, after the tool results of the penultimate round.
pub const FINAL_ROUND_NUDGE: &str = "You have one round left. Do not call any more tools. \
Using the information gathered so far, write your final review now.";

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum model turns, including the one that produces the answer.
    pub max_rounds: usize,
    pub retry: RetryPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            retry: RetryPolicy::default(),
        }
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModelTurn,
    ExecutingTools,
    Done(String),
    Failed(String),
}

/// The review agent. One instance runs one session.
pub struct ReviewAgent<'a> {
    config: AgentConfig,
    backend: &'a dyn ModelBackend,
    dispatcher: ToolDispatcher<'a>,
    sleeper: Box<dyn Sleeper>,
    system_instruction: String,
    tools: Vec<ToolDefinition>,
    conversation: Conversation,
    state: LoopState,
    stats: SessionStats,
}

impl<'a> ReviewAgent<'a> {
    pub fn new(
        config: AgentConfig,
        backend: &'a dyn ModelBackend,
        dispatcher: ToolDispatcher<'a>,
        system_instruction: impl Into<String>,
    ) -> Self {
        info!(
            "Initializing agent with model {} ({} rounds max)",
            backend.model_name(),
            config.max_rounds
        );

        Self {
            config,
            backend,
            dispatcher,
            sleeper: Box::new(TokioSleeper),
            system_instruction: system_instruction.into(),
            tools: get_tool_definitions(),
            conversation: Conversation::new(),
            state: LoopState::AwaitingModelTurn,
            stats: SessionStats::default(),
        }
    }

    /// Replace the timer used for rate-limit backoff.
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    #[cfg(test)]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Run the session for `query` until a final answer, an error, the
    /// round budget or cancellation.
    pub async fn run(
        &mut self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<ReviewOutcome, AgentError> {
        let result = self.run_rounds(query, cancel).await;

        self.state = match &result {
            Ok(outcome) => LoopState::Done(outcome.review.clone()),
            Err(e) => LoopState::Failed(e.to_string()),
        };
        result
    }

    async fn run_rounds(
        &mut self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<ReviewOutcome, AgentError> {
        self.conversation.push_user(query);
        let max_rounds = self.config.max_rounds;

        for round in 0..max_rounds {
            self.state = LoopState::AwaitingModelTurn;
            info!("[{}/{}] Thinking...", round + 1, max_rounds);

            let turn = self.request_turn(cancel).await?;
            self.stats.rounds += 1;

            if turn.tool_calls.is_empty() {
                info!("Review finished after {} round(s)", round + 1);
                self.conversation.push_model_text(turn.text.clone());
                return Ok(ReviewOutcome {
                    review: turn.text,
                    stats: self.stats,
                });
            }

            self.state = LoopState::ExecutingTools;
            let ModelTurn { text, tool_calls } = turn;
            self.conversation.push_tool_calls(text, tool_calls.clone());

            let results = self.execute_tools(&tool_calls, cancel).await?;
            for (call, result) in tool_calls.iter().zip(results) {
                self.conversation
                    .push_tool_result(call.name.clone(), result.into_text());
            }
            self.stats.tool_calls += tool_calls.len();

            if round + 2 == max_rounds {
                debug!("Penultimate round, asking for the final answer");
                self.conversation.push_user(FINAL_ROUND_NUDGE);
            }
        }

        warn!("No final answer after {} rounds", max_rounds);
        Err(AgentError::LoopLimitExceeded(max_rounds))
    }

    /// Ask the back-end for the next turn, retrying while rate limited.
    async fn request_turn(&self, cancel: &CancellationToken) -> Result<ModelTurn, AgentError> {
        let request = GenerateRequest {
            system_instruction: &self.system_instruction,
            conversation: &self.conversation,
            tools: &self.tools,
        };
        let policy = self.config.retry;
        let mut retries = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                outcome = self.backend.generate(request) => outcome,
            };

            match outcome {
                Ok(turn) => return Ok(turn),
                Err(BackendError::RateLimited(reason)) if retries < policy.max_retries => {
                    let wait = policy.backoff(retries);
                    warn!(
                        "Rate limited ({}). Waiting {}s before retry {}/{}...",
                        reason,
                        wait.as_secs(),
                        retries + 1,
                        policy.max_retries
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                        _ = self.sleeper.sleep(wait) => {}
                    }
                    retries += 1;
                }
                Err(source @ BackendError::RateLimited(_)) => {
                    return Err(AgentError::RateLimitExhausted { retries, source })
                }
                Err(e) => return Err(AgentError::Backend(e)),
            }
        }
    }

    /// Run every call of a turn concurrently; results keep call order.
    async fn execute_tools(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolResult>, AgentError> {
        let pending = calls.iter().map(|call| self.dispatcher.execute(call));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            results = join_all(pending) => Ok(results),
        }
    }
}
