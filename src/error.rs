//! Error types shared across the reviewer.
//!
//! Each layer has its own enum so callers can tell a fatal session error
//! from one that is only reported back to the model as a tool result.
//! The binary converts everything to `anyhow::Error` at the boundary.

use std::path::PathBuf;

/// Errors raised by the stdio JSON-RPC transport and the language server client.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Reading from or writing to the child process failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream no longer follows `Content-Length` framing.
    #[error("malformed frame: {0}")]
    Framing(String),

    /// A frame body was not valid JSON-RPC.
    #[error("invalid JSON-RPC message: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered the request with an `error` object.
    #[error("lsp error {code}: {message}")]
    Server { code: i64, message: String },

    /// The language server binary could not be started.
    #[error("failed to start language server `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The `initialize` request failed; the client is unusable.
    #[error("failed to initialize language server: {0}")]
    Handshake(Box<RpcError>),

    /// Only absolute paths have a `file://` URI.
    #[error("cannot build a file URI for {}", .0.display())]
    InvalidPath(PathBuf),

    /// The session deadline passed while waiting for the server.
    #[error("request cancelled")]
    Cancelled,
}

/// Errors from executing a single tool call.
///
/// These never abort a session; the dispatcher turns them into an
/// `Error: ...` result string for the model.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid argument {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("path {0:?} is outside project root")]
    OutsideRoot(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("find references failed: {0}")]
    Analysis(#[from] RpcError),
}

/// Errors reported by a model back-end.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The provider throttled the request (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("model API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

/// Errors that end a review session.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent: generate content: {0}")]
    Backend(#[source] BackendError),

    #[error("agent: still rate limited after {retries} retries: {source}")]
    RateLimitExhausted {
        retries: usize,
        #[source]
        source: BackendError,
    },

    #[error("agent: loop limit exceeded after {0} rounds")]
    LoopLimitExceeded(usize),

    #[error("agent: session cancelled")]
    Cancelled,
}
