//! Per-page text extraction.
//!
//! Two parsers are available: pdfium (through `pdfium-render`, needs the
//! pdfium shared library at runtime) and `lopdf` (pure Rust, always
//! available). [`ExtractorBackend::Auto`] tries to bind pdfium and quietly
//! falls back to lopdf when it cannot.
//!
//! Both parsers are CPU-bound and run inside `spawn_blocking`; pdfium also
//! keeps thread-local state, so it must not be driven from a runtime worker.

use crate::error::ProcessError;
use crate::progress::ProgressReporter;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Environment variable naming a directory that contains the pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Which PDF parser the basic branch uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorBackend {
    /// pdfium when it can be bound, lopdf otherwise (default).
    #[default]
    Auto,
    /// pdfium only; binding failure is an error.
    Pdfium,
    /// Pure-Rust lopdf.
    Lopdf,
}

impl ExtractorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorBackend::Auto => "auto",
            ExtractorBackend::Pdfium => "pdfium",
            ExtractorBackend::Lopdf => "lopdf",
        }
    }
}

impl FromStr for ExtractorBackend {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ExtractorBackend::Auto),
            "pdfium" => Ok(ExtractorBackend::Pdfium),
            "lopdf" => Ok(ExtractorBackend::Lopdf),
            other => Err(ProcessError::InvalidConfig(format!(
                "unknown extractor backend '{other}' (expected auto, pdfium or lopdf)"
            ))),
        }
    }
}

/// Text of one page. `page_num` is 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page_num: usize,
    pub text: String,
}

impl PageText {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Everything the basic branch needs from a PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// One entry per page, in page order, blank pages included.
    pub pages: Vec<PageText>,
    /// Page count as reported by the parser.
    pub total_pages: usize,
    /// Parser that produced the text (`pdfium` or `lopdf`).
    pub processor: &'static str,
}

impl ExtractedDocument {
    /// Pages that carry any non-whitespace text.
    pub fn pages_with_text(&self) -> usize {
        self.pages.iter().filter(|p| !p.is_blank()).count()
    }

    /// Markdown: one `# Page {n}` section per page with text.
    ///
    /// A document without any text gets a short notice instead of an empty
    /// string.
    pub fn markdown(&self) -> String {
        let body: String = self
            .pages
            .iter()
            .filter(|p| !p.is_blank())
            .map(|p| format!("# Page {}\n\n{}\n\n", p.page_num, p.text))
            .collect();
        if body.is_empty() {
            format!(
                "# No extractable text\n\nThe document has {} page(s) but none of them carry a text layer.\n",
                self.total_pages
            )
        } else {
            body
        }
    }

    /// Plain text: the non-blank pages joined by a blank line.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .filter(|p| !p.is_blank())
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Extract per-page text from `path`.
///
/// Reports a progress update per page, moving from 0.3 to 0.8.
pub async fn extract_document(
    path: &Path,
    backend: ExtractorBackend,
    progress: &ProgressReporter,
) -> Result<ExtractedDocument, ProcessError> {
    let path = path.to_path_buf();
    let progress = progress.clone();

    tokio::task::spawn_blocking(move || extract_blocking(&path, backend, &progress))
        .await
        .map_err(|e| ProcessError::Internal(format!("Extraction task panicked: {e}")))?
}

fn extract_blocking(
    path: &Path,
    backend: ExtractorBackend,
    progress: &ProgressReporter,
) -> Result<ExtractedDocument, ProcessError> {
    match backend {
        ExtractorBackend::Lopdf => extract_with_lopdf(path, progress),
        ExtractorBackend::Pdfium => {
            let pdfium = bind_pdfium()?;
            extract_with_pdfium(&pdfium, path, progress)
        }
        ExtractorBackend::Auto => match bind_pdfium() {
            Ok(pdfium) => extract_with_pdfium(&pdfium, path, progress),
            Err(e) => {
                debug!("pdfium unavailable, using lopdf: {}", e);
                extract_with_lopdf(path, progress)
            }
        },
    }
}

/// Bind pdfium from `PDFIUM_LIB_PATH` when set, else from the system.
fn bind_pdfium() -> Result<Pdfium, ProcessError> {
    let bindings = match std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        Some(dir) => {
            let dir = PathBuf::from(dir);
            let lib = Pdfium::pdfium_platform_library_name_at_path(&dir);
            Pdfium::bind_to_library(&lib).map_err(|e| {
                ProcessError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e))
            })?
        }
        None => Pdfium::bind_to_system_library()
            .map_err(|e| ProcessError::PdfiumBindingFailed(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}

fn extract_with_pdfium(
    pdfium: &Pdfium,
    path: &Path,
    progress: &ProgressReporter,
) -> Result<ExtractedDocument, ProcessError> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ProcessError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let total_pages = document.pages().len() as usize;
    info!("PDF loaded with pdfium: {} pages", total_pages);
    progress.report(0.2, format!("Processing {total_pages} pages..."));

    let mut pages = Vec::with_capacity(total_pages);
    for (idx, page) in document.pages().iter().enumerate() {
        let page_num = idx + 1;
        let text = match page.text() {
            Ok(t) => t.all(),
            Err(e) => {
                warn!("Page {} text unreadable, treating as empty: {:?}", page_num, e);
                String::new()
            }
        };
        pages.push(PageText { page_num, text });
        report_page(progress, page_num, total_pages);
    }

    Ok(ExtractedDocument {
        pages,
        total_pages,
        processor: "pdfium",
    })
}

fn extract_with_lopdf(
    path: &Path,
    progress: &ProgressReporter,
) -> Result<ExtractedDocument, ProcessError> {
    let document = lopdf::Document::load(path).map_err(|e| ProcessError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    let total_pages = page_numbers.len();
    info!("PDF loaded with lopdf: {} pages", total_pages);
    progress.report(0.2, format!("Processing {total_pages} pages..."));

    let mut pages = Vec::with_capacity(total_pages);
    for (idx, number) in page_numbers.iter().enumerate() {
        let page_num = idx + 1;
        let text = match document.extract_text(&[*number]) {
            Ok(t) => t,
            Err(e) => {
                warn!("Page {} text unreadable, treating as empty: {}", page_num, e);
                String::new()
            }
        };
        pages.push(PageText { page_num, text });
        report_page(progress, page_num, total_pages);
    }

    Ok(ExtractedDocument {
        pages,
        total_pages,
        processor: "lopdf",
    })
}

fn report_page(progress: &ProgressReporter, page_num: usize, total_pages: usize) {
    let fraction = 0.3 + page_num as f32 / total_pages.max(1) as f32 * 0.5;
    progress.report(
        fraction,
        format!("Processing page {page_num}/{total_pages}..."),
    );
}

/// Page count via lopdf, without extracting any text.
pub fn count_pages(path: &Path) -> Option<usize> {
    lopdf::Document::load(path)
        .ok()
        .map(|doc| doc.get_pages().len())
}
