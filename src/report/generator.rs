//! Report generation.
//!
//! This module renders a finished review as Markdown, JSON or plain text.

use crate::models::{ReportMetadata, ReviewReport};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &ReviewReport) -> String {
    let mut output = String::new();

    output.push_str("# YoReviewer Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_query_section(&report.metadata.query));

    output.push_str("## Review\n\n");
    output.push_str(report.review.trim_end());
    output.push_str("\n\n");

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Project:** `{}`\n", metadata.project));
    section.push_str(&format!("- **Persona:** {}\n", metadata.persona));
    section.push_str(&format!(
        "- **Review Date:** {}\n",
        metadata.review_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Rounds:** {}\n", metadata.rounds));
    section.push_str(&format!("- **Tool Calls:** {}\n", metadata.tool_calls));
    section.push_str(&format!(
        "- **Review Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Quote the request so the report stands on its own.
fn generate_query_section(query: &str) -> String {
    let mut section = String::new();

    section.push_str("## Request\n\n");
    for line in query.lines() {
        section.push_str(&format!("> {}\n", line));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by YoReviewer*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &ReviewReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Plain text: just the review, for piping.
pub fn generate_text_report(report: &ReviewReport) -> String {
    let mut output = report.review.trim_end().to_string();
    output.push('\n');
    output
}

/// Write rendered report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create report file {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(())
}
