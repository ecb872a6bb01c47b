//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::{Path, PathBuf};

/// YoReviewer - LLM code reviewer with language-server tools
///
/// Ask a question about a Go project and get a review back. The model
/// explores the code through find-references, read-file, get-diff and
/// find-symbol before it answers.
///
/// Examples:
///   yoreviewer ./my-service "Review the error handling in the store package"
///   yoreviewer ./my-service "Is the new cache safe?" --persona go-expert
///   yoreviewer ./my-service "Summarize my changes" --format json -o review.json
///   yoreviewer --list-personas
///   yoreviewer --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Project directory to review
    #[arg(
        value_name = "PROJECT",
        required_unless_present_any = ["init_config", "list_personas"]
    )]
    pub project: Option<PathBuf>,

    /// What to review, in free text
    #[arg(
        value_name = "QUERY",
        required_unless_present_any = ["init_config", "list_personas"]
    )]
    pub query: Option<String>,

    /// Reviewer persona
    ///
    /// A built-in name (architect, go-expert) or the stem of a TOML file in
    /// the persona directory. Defaults to general.default_persona.
    #[arg(short, long, value_name = "NAME")]
    pub persona: Option<String>,

    /// Directory holding persona TOML files
    #[arg(long, value_name = "DIR", env = "PERSONA_DIR")]
    pub persona_dir: Option<PathBuf>,

    /// Gemini model to use
    #[arg(short, long, env = "YOREVIEWER_MODEL")]
    pub model: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gemini API base URL
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Maximum model rounds per session
    #[arg(long, value_name = "COUNT")]
    pub max_rounds: Option<usize>,

    /// Session timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Language server executable
    #[arg(long, value_name = "CMD")]
    pub lsp_command: Option<String>,

    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (text, markdown, json)
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .yoreviewer.toml in the current directory,
    /// then in the project directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .yoreviewer.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// List available personas and exit
    #[arg(long)]
    pub list_personas: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// The review text only (default)
    #[default]
    Text,
    /// Markdown with a metadata header
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether this invocation exits before running a review.
    pub fn is_utility_command(&self) -> bool {
        self.init_config || self.list_personas
    }

    /// Project directory; empty when not given (validated first).
    pub fn project_dir(&self) -> &Path {
        self.project.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Review query; empty when not given (validated first).
    pub fn query_text(&self) -> &str {
        self.query.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.is_utility_command() {
            return Ok(());
        }

        let project = self.project_dir();
        if !project.exists() {
            return Err(format!(
                "Project directory does not exist: {}",
                project.display()
            ));
        }
        if !project.is_dir() {
            return Err(format!(
                "Project path is not a directory: {}",
                project.display()
            ));
        }

        if self.query_text().trim().is_empty() {
            return Err("Query must not be empty".to_string());
        }

        if self.max_rounds == Some(0) {
            return Err("Max rounds must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(ref url) = self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err("Missing API key: set GEMINI_API_KEY or pass --api-key".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `general.verbose`; `--quiet` still wins over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
