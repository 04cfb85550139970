//! Format rendering: Markdown → HTML, plain text and JSON.
//!
//! ## Rule order for plain text
//!
//! Markup is removed by a fixed sequence of regex passes: headings, bold,
//! italic, inline code, links, table pipes, rules, then whitespace cleanup.
//! Bold must run before italic so `**x**` is not read as two empty italics.
//! The whole sequence repeats until the output stops changing, so running
//! [`markdown_to_text`] on its own output is a no-op.

use crate::error::ProcessError;
use crate::output::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;

const HTML_TITLE: &str = "PDF Parsing Result";

const HTML_STYLE: &str = r#"        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            line-height: 1.6;
            max-width: 800px;
            margin: 0 auto;
            padding: 20px;
            color: #333;
        }
        h1, h2, h3 { color: #667eea; }
        table {
            border-collapse: collapse;
            width: 100%;
            margin: 20px 0;
        }
        th, td {
            border: 1px solid #ddd;
            padding: 12px;
            text-align: left;
        }
        th { background-color: #f8f9fa; }
        code {
            background-color: #f8f9fa;
            padding: 2px 4px;
            border-radius: 3px;
        }
        blockquote {
            border-left: 4px solid #667eea;
            margin: 0;
            padding-left: 20px;
            color: #666;
        }"#;

// ── HTML ─────────────────────────────────────────────────────────────────────

/// Render Markdown as a complete, styled HTML document.
///
/// The result always starts with `<!DOCTYPE html>` and ends with `</html>`.
pub fn markdown_to_html(markdown: &str) -> String {
    let body = html_body(markdown);
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"UTF-8\">\n    <title>{HTML_TITLE}</title>\n    <style>\n{HTML_STYLE}\n    </style>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

#[cfg(feature = "markdown")]
fn html_body(markdown: &str) -> String {
    use pulldown_cmark::{html, Event, Options, Parser};

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);

    // Raw HTML in extracted text is shown, never interpreted.
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(not(feature = "markdown"))]
fn html_body(markdown: &str) -> String {
    naive_html_body(markdown)
}

/// Line-based fallback used when the CommonMark renderer is compiled out.
///
/// `#`, `##` and `###` prefixes become heading tags; every other line is
/// escaped and followed by `<br>`.
pub fn naive_html_body(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len() * 2);
    for line in markdown.lines() {
        let (tag, rest) = if let Some(rest) = line.strip_prefix("### ") {
            ("h3", rest)
        } else if let Some(rest) = line.strip_prefix("## ") {
            ("h2", rest)
        } else if let Some(rest) = line.strip_prefix("# ") {
            ("h1", rest)
        } else {
            out.push_str(&escape_html(line));
            out.push_str("<br>\n");
            continue;
        };
        out.push_str(&format!("<{tag}>{}</{tag}>\n", escape_html(rest.trim())));
    }
    out
}

/// Escape the five HTML-significant characters.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ── Plain text ───────────────────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]*").unwrap());
static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static RE_ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static RE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`(.*?)`").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(.*?)\]\(.*?\)").unwrap());
static RE_PIPE_LEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*\|[ \t]*").unwrap());
static RE_PIPE_TRAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]*\|[ \t]*$").unwrap());
static RE_PIPE_INNER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]*\|[ \t]*").unwrap());
static RE_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{3,}").unwrap());
static RE_TRAILING_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strip Markdown syntax, keeping the readable text.
///
/// Link text survives, link targets don't. Table cells are separated by a
/// single space. At most one blank line separates paragraphs.
pub fn markdown_to_text(markdown: &str) -> String {
    let mut current = markdown.replace("\r\n", "\n").replace('\r', "\n");
    // Every pass shortens the text or replaces a pipe, so this terminates.
    loop {
        let next = strip_markup_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_markup_once(input: &str) -> String {
    let s = RE_HEADING.replace_all(input, "");
    let s = RE_BOLD.replace_all(&s, "$1");
    let s = RE_ITALIC.replace_all(&s, "$1");
    let s = RE_CODE.replace_all(&s, "$1");
    let s = RE_LINK.replace_all(&s, "$1");
    let s = RE_PIPE_LEAD.replace_all(&s, "");
    let s = RE_PIPE_TRAIL.replace_all(&s, "");
    let s = RE_PIPE_INNER.replace_all(&s, " ");
    let s = RE_RULE.replace_all(&s, "");
    let s = RE_TRAILING_WS.replace_all(&s, "");
    let s = RE_BLANK_LINES.replace_all(&s, "\n\n");
    s.trim().to_string()
}

// ── JSON ─────────────────────────────────────────────────────────────────────

/// Descriptive fields for the JSON rendition.
#[derive(Debug, Clone)]
pub struct DocumentInfo<'a> {
    pub title: &'a str,
    pub pages: usize,
    pub method: Method,
    /// Parser name, when one was used (`pdfium`, `lopdf`).
    pub processor: Option<&'a str>,
    pub file_size: u64,
    /// Elapsed processing time in seconds.
    pub processing_time: f64,
}

/// Build the pretty-printed JSON rendition.
///
/// `processed_at` is the current UTC time in RFC 3339. Non-ASCII text is
/// written verbatim.
pub fn document_json(info: &DocumentInfo<'_>, text: &str, markdown: &str) -> Result<String, ProcessError> {
    let mut document = json!({
        "title": info.title,
        "pages": info.pages,
        "processed_at": chrono::Utc::now().to_rfc3339(),
        "method": info.method,
    });
    if let Some(processor) = info.processor {
        document["processor"] = json!(processor);
    }

    let value = json!({
        "document": document,
        "content": {
            "text": text,
            "markdown": markdown,
        },
        "metadata": {
            "file_size": info.file_size,
            "processing_time": info.processing_time,
        },
    });

    serde_json::to_string_pretty(&value)
        .map_err(|e| ProcessError::Internal(format!("JSON rendering failed: {e}")))
}

// ── Files ────────────────────────────────────────────────────────────────────

/// Write one rendition to `dir/{stem}.{ext}` and return its path.
pub async fn write_rendition(
    dir: &Path,
    stem: &str,
    ext: &str,
    content: &str,
) -> Result<PathBuf, ProcessError> {
    let path = dir.join(format!("{stem}.{ext}"));
    tokio::fs::write(&path, content)
        .await
        .map_err(|source| ProcessError::OutputWriteFailed {
            path: path.clone(),
            source,
        })?;
    debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(path)
}
