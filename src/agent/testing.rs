//! In-memory doubles for the agent's collaborators.

use crate::agent::backend::{GenerateRequest, ModelBackend, ModelTurn};
use crate::agent::retry::Sleeper;
use crate::error::{BackendError, RpcError, ToolError};
use crate::lsp::{CodeAnalyzer, FileLocation, Position};
use crate::models::SymbolLocation;
use crate::symbols::SymbolResolver;
use crate::workspace::{DiffProvider, FileReader};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeAnalyzer {
    response: Mutex<Vec<FileLocation>>,
    failure: Mutex<Option<String>>,
    delays: Mutex<HashMap<PathBuf, Duration>>,
    requests: Mutex<Vec<(PathBuf, Position)>>,
}

impl FakeAnalyzer {
    pub fn respond(&self, locations: Vec<FileLocation>) {
        *self.response.lock().unwrap() = locations;
    }

    pub fn fail(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn delay(&self, file: impl Into<PathBuf>, delay: Duration) {
        self.delays.lock().unwrap().insert(file.into(), delay);
    }

    pub fn requests(&self) -> Vec<(PathBuf, Position)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeAnalyzer for FakeAnalyzer {
    async fn references(
        &self,
        file: &Path,
        position: Position,
    ) -> Result<Vec<FileLocation>, RpcError> {
        self.requests
            .lock()
            .unwrap()
            .push((file.to_path_buf(), position));

        let delay = self.delays.lock().unwrap().get(file).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(RpcError::Server {
                code: -32603,
                message,
            });
        }
        Ok(self.response.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeReader {
    files: Mutex<HashMap<String, String>>,
}

impl FakeReader {
    pub fn insert(&self, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
    }
}

impl FileReader for FakeReader {
    fn read(&self, relative_path: &str) -> Result<String, ToolError> {
        self.files
            .lock()
            .unwrap()
            .get(relative_path)
            .cloned()
            .ok_or_else(|| ToolError::Io {
                path: PathBuf::from(relative_path),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
    }
}

#[derive(Default)]
pub struct FakeDiff {
    patch: Mutex<String>,
}

impl FakeDiff {
    pub fn set(&self, patch: &str) {
        *self.patch.lock().unwrap() = patch.to_string();
    }
}

impl DiffProvider for FakeDiff {
    fn diff(&self) -> Result<String, ToolError> {
        Ok(self.patch.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeResolver {
    symbols: Mutex<HashMap<String, Vec<SymbolLocation>>>,
}

impl FakeResolver {
    pub fn insert(&self, name: &str, location: SymbolLocation) {
        self.symbols
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(location);
    }
}

impl SymbolResolver for FakeResolver {
    fn find_symbol(&self, name: &str) -> Result<Vec<SymbolLocation>, ToolError> {
        Ok(self
            .symbols
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

/// Replays queued responses, then repeats `fallback` forever.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<ModelTurn, BackendError>>>,
    fallback: Option<ModelTurn>,
    conversation_lengths: Mutex<Vec<usize>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<ModelTurn, BackendError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn repeating(turn: ModelTurn) -> Self {
        Self {
            fallback: Some(turn),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.conversation_lengths.lock().unwrap().len()
    }

    pub fn conversation_lengths(&self) -> Vec<usize> {
        self.conversation_lengths.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<ModelTurn, BackendError> {
        self.conversation_lengths
            .lock()
            .unwrap()
            .push(request.conversation.len());

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback
            .clone()
            .ok_or_else(|| BackendError::InvalidResponse("script exhausted".into()))
    }
}

/// Records requested delays and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// Never wakes up.
pub struct StuckSleeper;

#[async_trait]
impl Sleeper for StuckSleeper {
    async fn sleep(&self, _duration: Duration) {
        std::future::pending::<()>().await;
    }
}
