//! One review session, end to end.
//!
//! Builds the component graph (persona, language server, workspace
//! collaborators, dispatcher, back-end, agent), runs the agent under the
//! session deadline and always tears the language server down.

use crate::agent::{
    AgentConfig, GeminiBackend, LoopState, ModelBackend, RetryPolicy, ReviewAgent, ToolDispatcher,
};
use crate::config::{AgentSettings, Config};
use crate::error::AgentError;
use crate::lsp::LspProcess;
use crate::models::{ReportMetadata, ReviewReport};
use crate::persona::Persona;
use crate::symbols::AstSymbolResolver;
use crate::workspace::{FsReader, GitDiff};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What to review.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub project: PathBuf,
    pub query: String,
    /// Falls back to `general.default_persona`.
    pub persona: Option<String>,
}

impl From<&AgentSettings> for AgentConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_rounds: settings.max_rounds,
            retry: RetryPolicy {
                max_retries: settings.rate_limit_retries,
                backoff_step: Duration::from_secs(settings.rate_limit_backoff_seconds),
            },
        }
    }
}

/// Run one review session.
///
/// `interrupt` lets the caller abort the session (Ctrl-C); the session
/// deadline is layered on top of it.
pub async fn run_review(
    request: &ReviewRequest,
    config: &Config,
    api_key: &str,
    interrupt: &CancellationToken,
) -> Result<ReviewReport> {
    let started = Instant::now();
    let review_date = Utc::now();

    let persona_name = request
        .persona
        .clone()
        .unwrap_or_else(|| config.general.default_persona.clone());
    let persona = Persona::resolve(&config.general.persona_dir, &persona_name)?;
    info!("Persona: {}", persona.name);

    let backend = GeminiBackend::new(config.model.clone(), api_key)
        .context("failed to create model client")?;

    let cancel = interrupt.child_token();
    let timeout = Duration::from_secs(config.agent.session_timeout_seconds);
    let deadline = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    warn!("Session deadline of {}s reached, cancelling", timeout.as_secs());
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        })
    };

    let lsp = LspProcess::spawn(&request.project, &config.lsp, cancel.clone()).await;
    let mut lsp = match lsp {
        Ok(lsp) => lsp,
        Err(_) if cancel.is_cancelled() => {
            deadline.abort();
            return Err(cancelled(interrupt, timeout));
        }
        Err(e) => {
            deadline.abort();
            return Err(e).context("failed to start language server");
        }
    };

    let root = lsp.root().to_path_buf();
    let reader = FsReader::new(root.clone());
    let differ = GitDiff::new(root.clone());
    let resolver = AstSymbolResolver::new(root.clone(), &config.symbols);

    let result = {
        let dispatcher = ToolDispatcher::new(root.clone(), &lsp, &reader, &differ, &resolver);
        let agent_config = AgentConfig::from(&config.agent);
        debug!("Rate-limit backoff schedule: {:?}", agent_config.retry.schedule());

        let mut agent = ReviewAgent::new(
            agent_config,
            &backend,
            dispatcher,
            persona.system_prompt.clone(),
        );
        let result = agent.run(&request.query, &cancel).await;

        if let LoopState::Failed(reason) = agent.state() {
            debug!(
                "Agent stopped after {} turn(s): {}",
                agent.conversation().len(),
                reason
            );
        }
        result
    };

    lsp.close().await;
    deadline.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(AgentError::Cancelled) => return Err(cancelled(interrupt, timeout)),
        Err(e) => return Err(e.into()),
    };

    let duration = started.elapsed().as_secs_f64();
    info!(
        "Review complete: {} round(s), {} tool call(s), {:.1}s",
        outcome.stats.rounds, outcome.stats.tool_calls, duration
    );

    Ok(ReviewReport {
        metadata: ReportMetadata {
            project: root.display().to_string(),
            query: request.query.clone(),
            persona: persona.name,
            model_used: backend.model_name().to_string(),
            review_date,
            rounds: outcome.stats.rounds,
            tool_calls: outcome.stats.tool_calls,
            duration_seconds: duration,
        },
        review: outcome.review,
    })
}

/// Ctrl-C cancels `interrupt`; the deadline only cancels its child.
fn cancelled(interrupt: &CancellationToken, timeout: Duration) -> anyhow::Error {
    if interrupt.is_cancelled() {
        anyhow::anyhow!("review interrupted")
    } else {
        anyhow::anyhow!("review timed out after {}s", timeout.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(project: PathBuf, persona: Option<&str>) -> ReviewRequest {
        ReviewRequest {
            project,
            query: "review".to_string(),
            persona: persona.map(String::from),
        }
    }

    #[test]
    fn test_agent_config_from_settings() {
        let settings = AgentSettings {
            max_rounds: 4,
            session_timeout_seconds: 60,
            rate_limit_retries: 3,
            rate_limit_backoff_seconds: 5,
        };
        let config = AgentConfig::from(&settings);
        assert_eq!(config.max_rounds, 4);
        assert_eq!(
            config.retry.schedule(),
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(15)
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_persona_fails_before_spawning() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.general.persona_dir = dir.path().to_path_buf();
        config.lsp.command = "yoreviewer-no-such-server".to_string();

        let err = run_review(
            &request(dir.path().to_path_buf(), Some("pirate")),
            &config,
            "key",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("failed to load persona"));
    }

    #[tokio::test]
    async fn test_missing_language_server_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.lsp.command = "yoreviewer-no-such-server".to_string();

        let err = run_review(
            &request(dir.path().to_path_buf(), None),
            &config,
            "key",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("failed to start language server"));
        assert!(format!("{:#}", err).contains("yoreviewer-no-such-server"));
    }

    /// `cat` echoes the client's own `initialize` back, so no response
    /// ever arrives and only cancellation can end the handshake.
    fn silent_server_config(dir: &TempDir, timeout_seconds: u64) -> Config {
        let mut config = Config::default();
        config.general.persona_dir = dir.path().to_path_buf();
        config.lsp.command = "cat".to_string();
        config.lsp.args = Vec::new();
        config.agent.session_timeout_seconds = timeout_seconds;
        config
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_deadline_unblocks_stalled_handshake() {
        let dir = TempDir::new().unwrap();
        let config = silent_server_config(&dir, 1);

        let started = Instant::now();
        let err = run_review(
            &request(dir.path().to_path_buf(), None),
            &config,
            "key",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "review timed out after 1s");
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_during_handshake() {
        let dir = TempDir::new().unwrap();
        let config = silent_server_config(&dir, 300);

        let interrupt = CancellationToken::new();
        {
            let interrupt = interrupt.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                interrupt.cancel();
            });
        }

        let started = Instant::now();
        let err = run_review(&request(dir.path().to_path_buf(), None), &config, "key", &interrupt)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "review interrupted");
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
