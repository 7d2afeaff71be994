//! Output formatting for command results.
//!
//! Every command builds a [`Report`] (a title, a few summary fields, text
//! sections and a JSON payload), picks a [`Format`] and calls
//! [`write_output`]. Plain output is just the section text, so results can
//! be piped straight into another tool.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Result, TokenwrightError};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Controls where and how output is written.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub format: Format,
    /// File to write to; stdout when `None`.
    pub out: Option<PathBuf>,
}

/// Supported output formats.
///
/// Mirrors [`crate::cli::OutputFormat`] without depending on clap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Plain,
    Json,
    Markdown,
}

/// A command result ready for formatting.
#[derive(Debug, Clone)]
pub struct Report {
    pub title: String,
    pub fields: Vec<(String, String)>,
    pub sections: Vec<ReportSection>,
    /// Machine-readable payload used for JSON output.
    pub data: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ReportSection {
    pub heading: String,
    pub body: String,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fields: Vec::new(),
            sections: Vec::new(),
            data: serde_json::Value::Null,
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((name.into(), value.to_string()));
        self
    }

    pub fn section(mut self, heading: impl Into<String>, body: impl Into<String>) -> Self {
        self.sections.push(ReportSection {
            heading: heading.into(),
            body: body.into(),
        });
        self
    }

    /// Attach a serializable payload for JSON output.
    pub fn data<T: Serialize>(mut self, data: &T) -> Result<Self> {
        self.data = serde_json::to_value(data)
            .map_err(|e| TokenwrightError::serialization("report payload", e))?;
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

pub fn format_report(report: &Report, format: Format) -> Result<String> {
    match format {
        Format::Plain => Ok(format_plain(report)),
        Format::Json => format_json(report),
        Format::Markdown => Ok(format_markdown(report)),
    }
}

/// Plain text: section bodies only. With several sections each gets a
/// `--- heading ---` separator line.
fn format_plain(report: &Report) -> String {
    let mut out = String::new();
    let single = report.sections.len() == 1;
    for section in &report.sections {
        if !single {
            out.push_str(&format!("--- {} ---\n", section.heading));
        }
        out.push_str(&section.body);
        if !section.body.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

fn format_json(report: &Report) -> Result<String> {
    let mut json = serde_json::to_string_pretty(&report.data)
        .map_err(|e| TokenwrightError::serialization("report as JSON", e))?;
    json.push('\n');
    Ok(json)
}

fn format_markdown(report: &Report) -> String {
    let mut out = format!("# {}\n\n", report.title);
    for (name, value) in &report.fields {
        out.push_str(&format!("- **{name}**: {value}\n"));
    }
    if !report.fields.is_empty() {
        out.push('\n');
    }
    for section in &report.sections {
        out.push_str(&format!("## {}\n\n```text\n", section.heading));
        out.push_str(&section.body);
        if !section.body.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n\n");
    }
    out
}

// ---------------------------------------------------------------------------
// Output writing
// ---------------------------------------------------------------------------

pub fn write_report(report: &Report, options: &FormatOptions) -> Result<()> {
    let formatted = format_report(report, options.format)?;
    write_output(&formatted, options)
}

/// Write to `options.out`, or stdout when no file is given.
pub fn write_output(content: &str, options: &FormatOptions) -> Result<()> {
    match options.out {
        Some(ref path) => write_to_file(content, path),
        None => std::io::stdout()
            .lock()
            .write_all(content.as_bytes())
            .map_err(|e| TokenwrightError::io("writing to stdout", e)),
    }
}

/// Write content to a file, creating parent directories if needed.
fn write_to_file(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            TokenwrightError::io(format!("creating directory '{}'", parent.display()), e)
        })?;
    }
    std::fs::write(path, content)
        .map_err(|e| TokenwrightError::io(format!("writing output to '{}'", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        Report::new("Context window")
            .field("budget", 60)
            .field("tokens", 57)
            .section("window", "First paragraph.\n\nLast paragraph.")
            .data(&serde_json::json!({ "tokens": 57, "text": "First paragraph." }))
            .unwrap()
    }

    #[test]
    fn plain_single_section_is_raw_text() {
        let out = format_report(&sample(), Format::Plain).unwrap();
        assert_eq!(out, "First paragraph.\n\nLast paragraph.\n");
    }

    #[test]
    fn plain_multiple_sections_are_separated() {
        let report = Report::new("Chunks").section("chunk 0", "a").section("chunk 1", "b\n");
        let out = format_report(&report, Format::Plain).unwrap();
        assert_eq!(out, "--- chunk 0 ---\na\n--- chunk 1 ---\nb\n");
    }

    #[test]
    fn json_is_the_payload() {
        let out = format_report(&sample(), Format::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["tokens"], 57);
    }

    #[test]
    fn markdown_lists_fields_and_sections() {
        let out = format_report(&sample(), Format::Markdown).unwrap();
        assert!(out.starts_with("# Context window\n"));
        assert!(out.contains("- **budget**: 60\n"));
        assert!(out.contains("## window\n\n```text\nFirst paragraph."));
    }

    #[test]
    fn write_to_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("dir").join("window.txt");
        write_to_file("hello", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }
}
