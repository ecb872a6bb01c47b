//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.yoreviewer.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".yoreviewer.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent loop settings.
    #[serde(default)]
    pub agent: AgentSettings,

    /// Language server settings.
    #[serde(default)]
    pub lsp: LspConfig,

    /// Symbol resolver settings.
    #[serde(default)]
    pub symbols: SymbolsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report file. The review goes to stdout when unset.
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Directory holding `<persona>.toml` files.
    #[serde(default = "default_persona_dir")]
    pub persona_dir: PathBuf,

    /// Persona used when none is given on the command line.
    #[serde(default = "default_persona")]
    pub default_persona: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: None,
            verbose: false,
            persona_dir: default_persona_dir(),
            default_persona: default_persona(),
        }
    }
}

fn default_persona_dir() -> PathBuf {
    PathBuf::from("configs/personas")
}

fn default_persona() -> String {
    "architect".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Base URL of the Gemini REST API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_request_timeout() -> u64 {
    120
}

/// Round budget, deadline and rate-limit policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum model turns per session.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Whole-session deadline in seconds.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_seconds: u64,

    /// Extra attempts after a rate-limited model call.
    #[serde(default = "default_rate_limit_retries")]
    pub rate_limit_retries: usize,

    /// Backoff step; attempt `n` waits `n * step`.
    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff_seconds: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            session_timeout_seconds: default_session_timeout(),
            rate_limit_retries: default_rate_limit_retries(),
            rate_limit_backoff_seconds: default_rate_limit_backoff(),
        }
    }
}

fn default_max_rounds() -> usize {
    10
}

fn default_session_timeout() -> u64 {
    300
}

fn default_rate_limit_retries() -> usize {
    2
}

fn default_rate_limit_backoff() -> u64 {
    30
}

/// Language server launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspConfig {
    /// Server executable.
    #[serde(default = "default_lsp_command")]
    pub command: String,

    /// Extra arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            command: default_lsp_command(),
            args: Vec::new(),
        }
    }
}

fn default_lsp_command() -> String {
    "gopls".to_string()
}

/// Symbol resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolsConfig {
    /// Directory names skipped while walking the project.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,
}

impl Default for SymbolsConfig {
    fn default() -> Self {
        Self {
            excludes: default_excludes(),
        }
    }
}

fn default_excludes() -> Vec<String> {
    vec!["vendor", ".git", "node_modules"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the current directory.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load configuration from a project directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref base_url) = args.base_url {
            self.model.base_url = base_url.clone();
        }
        if let Some(max_rounds) = args.max_rounds {
            self.agent.max_rounds = max_rounds;
        }
        if let Some(timeout) = args.timeout {
            self.agent.session_timeout_seconds = timeout;
        }
        if let Some(ref command) = args.lsp_command {
            self.lsp.command = command.clone();
        }
        if let Some(ref dir) = args.persona_dir {
            self.general.persona_dir = dir.clone();
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.clone());
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
