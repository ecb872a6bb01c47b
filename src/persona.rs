//! Reviewer personas.
//!
//! A persona supplies the system instruction for a session. Personas are
//! read from `<persona_dir>/<name>.toml`; `architect` and `go-expert` are
//! built in and used when no file overrides them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A reviewer identity and perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
}

const ARCHITECT_PROMPT: &str = r#"You are a senior software architect reviewing a Go code base.
Focus on package boundaries, dependency direction, interface design, error
propagation and testability. Gather evidence before you judge: use
find-symbol to locate definitions, find-references to see how they are used,
read-file to inspect code and get-diff to see uncommitted changes.
Cite files and line numbers for every finding. Finish with a concise,
prioritised list of recommendations."#;

const GO_EXPERT_PROMPT: &str = r#"You are an experienced Go developer reviewing code for
correctness and idiomatic style. Look for unchecked errors, goroutine and
channel misuse, data races, resource leaks, nil dereferences and
non-idiomatic naming. Use the available tools to read the code and follow
references before reporting. Cite files and line numbers for every finding."#;

/// Names of the personas compiled into the binary.
pub fn builtin_names() -> Vec<&'static str> {
    vec!["architect", "go-expert"]
}

fn builtin(name: &str) -> Option<Persona> {
    let (description, prompt) = match name {
        "architect" => ("Architecture and design review", ARCHITECT_PROMPT),
        "go-expert" => ("Idiomatic Go and correctness review", GO_EXPERT_PROMPT),
        _ => return None,
    };
    Some(Persona {
        name: name.to_string(),
        description: description.to_string(),
        system_prompt: prompt.to_string(),
    })
}

impl Persona {
    /// Load a persona from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read persona file {}", path.display()))?;
        let persona: Persona = toml::from_str(&content)
            .with_context(|| format!("failed to parse persona file {}", path.display()))?;
        Ok(persona)
    }

    /// Resolve `name`: a file in `dir` wins over the built-in persona.
    pub fn resolve(dir: &Path, name: &str) -> Result<Self> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            anyhow::bail!("invalid persona name {:?}", name);
        }

        let path = dir.join(format!("{}.toml", name));
        if path.exists() {
            return Self::load(&path);
        }

        builtin(name).with_context(|| {
            format!(
                "failed to load persona {:?}: no {} and no built-in persona with that name",
                name,
                path.display()
            )
        })
    }

    /// Built-in names plus every `*.toml` stem found in `dir`, sorted.
    pub fn available(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = builtin_names().into_iter().map(String::from).collect();

        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_string());
                    }
                }
            }
        }

        names.sort();
        names.dedup();
        names
    }
}
