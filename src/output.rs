//! Result types produced by the processing façade.
//!
//! [`ProcessingResult`] is the single shape every branch (engine, demo,
//! basic, remote) is normalised into. Its JSON form is also the response
//! body expected from a remote processing service, so the field names are
//! part of the wire contract.

use crate::config::{OutputFormat, OutputFormats};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which branch produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// The external layout engine.
    Mineru,
    /// Direct per-page text extraction.
    Basic,
    /// Fixed illustrative document; input was not read.
    Demo,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Mineru => "mineru",
            Method::Basic => "basic",
            Method::Demo => "demo",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four text renditions of one document, plus the paths of any
/// rendition files written to the output directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Renditions {
    #[serde(default)]
    pub markdown_content: String,
    #[serde(default)]
    pub html_content: String,
    #[serde(default)]
    pub text_content: String,
    #[serde(default)]
    pub json_content: String,

    /// `{stem}.md` written by the engine or demo branch.
    #[serde(default, rename = "markdown", skip_serializing_if = "Option::is_none")]
    pub markdown_path: Option<PathBuf>,
    #[serde(default, rename = "html", skip_serializing_if = "Option::is_none")]
    pub html_path: Option<PathBuf>,
    #[serde(default, rename = "text", skip_serializing_if = "Option::is_none")]
    pub text_path: Option<PathBuf>,
    #[serde(default, rename = "json", skip_serializing_if = "Option::is_none")]
    pub json_path: Option<PathBuf>,
}

impl Renditions {
    /// Content for one format.
    pub fn content(&self, format: OutputFormat) -> &str {
        match format {
            OutputFormat::Markdown => &self.markdown_content,
            OutputFormat::Html => &self.html_content,
            OutputFormat::Text => &self.text_content,
            OutputFormat::Json => &self.json_content,
        }
    }
}

/// Best-effort document counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    #[serde(default)]
    pub total_pages: usize,
    #[serde(default)]
    pub text_blocks: usize,
    #[serde(default)]
    pub tables: usize,
    #[serde(default)]
    pub formulas: usize,
}

impl ProcessingStats {
    /// Estimate counts from a Markdown document.
    ///
    /// * text blocks: non-blank paragraphs separated by a blank line
    /// * tables: number of GFM header separator rows, or 1 if any `|` occurs
    /// * formulas: number of `$` characters divided by two
    pub fn estimate(markdown: &str, total_pages: usize) -> Self {
        let text_blocks = markdown
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .count();

        let tables = if markdown.contains('|') {
            markdown.lines().filter(|l| is_separator_row(l)).count().max(1)
        } else {
            0
        };

        let formulas = markdown.matches('$').count() / 2;

        Self {
            total_pages,
            text_blocks,
            tables,
            formulas,
        }
    }
}

/// A GFM table separator row such as `|---|:---:|`.
fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

/// Outcome of processing one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,

    #[serde(default)]
    pub outputs: Renditions,

    #[serde(default)]
    pub stats: ProcessingStats,

    /// Branch that produced the result. Absent on failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,

    /// Human-readable failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Diagnostic trace for failures (error source chain or panic payload).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,

    /// Original upload name; stamped by the batch controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl ProcessingResult {
    /// A successful result.
    pub fn succeeded(outputs: Renditions, stats: ProcessingStats, method: Method) -> Self {
        Self {
            success: true,
            outputs,
            stats,
            method: Some(method),
            error: None,
            traceback: None,
            file_name: None,
        }
    }

    /// A failed result carrying a message and a trace.
    pub fn failed(error: impl Into<String>, traceback: impl Into<String>) -> Self {
        Self {
            success: false,
            outputs: Renditions::default(),
            stats: ProcessingStats::default(),
            method: None,
            error: Some(error.into()),
            traceback: Some(traceback.into()),
            file_name: None,
        }
    }

    /// Downloadable artifacts for the enabled formats, named `{stem}.{ext}`.
    ///
    /// Failed results and formats with empty content yield nothing.
    pub fn artifacts(&self, stem: &str, formats: &OutputFormats) -> Vec<Artifact> {
        if !self.success {
            return Vec::new();
        }
        formats
            .iter()
            .filter_map(|format| {
                let content = self.outputs.content(format);
                if content.is_empty() {
                    return None;
                }
                Some(Artifact {
                    file_name: format!("{stem}.{}", format.extension()),
                    mime_type: format.mime_type(),
                    format,
                    content: content.to_string(),
                })
            })
            .collect()
    }
}

/// A rendition ready to be offered for download or written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub file_name: String,
    pub mime_type: String,
    pub format: OutputFormat,
    pub content: String,
}
