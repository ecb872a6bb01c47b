//! YoReviewer - LLM code reviewer backed by a language server
//!
//! A CLI tool that lets a Gemini model review a Go project through
//! tool calls: cross-references from gopls, file reads, the working-tree
//! diff and symbol lookup.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Any error (configuration, language server, model API, timeout)

mod agent;
mod cli;
mod config;
mod error;
mod lsp;
mod models;
mod persona;
mod report;
mod session;
mod symbols;
mod workspace;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use persona::Persona;
use session::ReviewRequest;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config comes first so `general.verbose` can pick the log level.
    let loaded = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    let mut config = loaded.config;
    config.merge_with_args(&args);

    init_logging(args.log_level(config.general.verbose));

    info!("YoReviewer v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", redacted(&args));
    for warning in &loaded.warnings {
        warn!("{}", warning);
    }
    match loaded.source {
        Some(ref path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    match run(args, config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Review failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .yoreviewer.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("Created {} with default settings.", CONFIG_FILE_NAME);
    Ok(())
}

/// Initialize logging at `level`.
///
/// Logs go to stderr; stdout carries the review.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

async fn run(args: Args, config: Config) -> Result<()> {
    if args.list_personas {
        let dir = &config.general.persona_dir;
        for name in Persona::available(dir) {
            match Persona::resolve(dir, &name) {
                Ok(persona) => println!("{:<16} {}", persona.name, persona.description),
                Err(e) => {
                    warn!("{:#}", e);
                    println!("{}", name);
                }
            }
        }
        return Ok(());
    }

    let api_key = args.api_key.clone().unwrap_or_default();
    let request = ReviewRequest {
        project: args.project_dir().to_path_buf(),
        query: args.query_text().to_string(),
        persona: args.persona.clone(),
    };

    info!("Reviewing {}", request.project.display());
    info!("Model: {}", config.model.name);

    let interrupt = CancellationToken::new();
    {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, shutting down");
                interrupt.cancel();
            }
        });
    }

    let report = session::run_review(&request, &config, &api_key, &interrupt).await?;

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
        OutputFormat::Text => report::generate_text_report(&report),
    };

    match config.general.output {
        Some(ref path) => {
            report::write_report(&output, path)?;
            info!("Report saved to {}", path.display());
        }
        None => print!("{}", output),
    }

    Ok(())
}

/// Configuration plus where it came from. Logging is not installed yet
/// while loading, so problems are collected and logged afterwards.
struct LoadedConfig {
    config: Config,
    source: Option<PathBuf>,
    warnings: Vec<String>,
}

impl LoadedConfig {
    fn defaults(warnings: Vec<String>) -> Self {
        Self {
            config: Config::default(),
            source: None,
            warnings,
        }
    }
}

/// Load configuration from file or use defaults.
///
/// Lookup order: `--config`, the current directory, the project root.
/// Only an explicit `--config` that fails to load is an error.
fn load_config(args: &Args) -> Result<LoadedConfig> {
    if let Some(ref config_path) = args.config {
        return Ok(LoadedConfig {
            config: Config::load(config_path)?,
            source: Some(config_path.clone()),
            warnings: Vec::new(),
        });
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            return Ok(LoadedConfig {
                config,
                source: Some(PathBuf::from(CONFIG_FILE_NAME)),
                warnings: Vec::new(),
            });
        }
        Ok(None) => {}
        Err(e) => {
            return Ok(LoadedConfig::defaults(vec![format!(
                "Failed to load config: {:#}",
                e
            )]));
        }
    }

    let mut warnings = Vec::new();
    if args.project.is_some() {
        match Config::load_from_dir(args.project_dir()) {
            Ok(Some(config)) => {
                return Ok(LoadedConfig {
                    config,
                    source: Some(args.project_dir().join(CONFIG_FILE_NAME)),
                    warnings,
                });
            }
            Ok(None) => {}
            Err(e) => warnings.push(format!("Failed to load project config: {:#}", e)),
        }
    }

    Ok(LoadedConfig::defaults(warnings))
}

/// Arguments with the API key masked, for debug logging.
fn redacted(args: &Args) -> Args {
    let mut args = args.clone();
    if args.api_key.is_some() {
        args.api_key = Some("***".to_string());
    }
    args
}
