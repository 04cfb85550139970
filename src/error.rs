//! Error types for the mineru-pdf2md library.
//!
//! Errors fall into two groups:
//!
//! * **File-level**: the PDF cannot be opened, the engine crashed, a
//!   rendition could not be written. The façade turns these into a failed
//!   [`crate::output::ProcessingResult`] so the rest of the batch keeps going.
//!
//! * **Batch-level**: the upload is over the size ceiling or the temporary
//!   workspace cannot be created. Returned as `Err(ProcessError)` from
//!   [`crate::batch::process_batch`].
//!
//! An unreachable remote API is neither: it only triggers the fallback to
//! basic extraction and is never surfaced as an error.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the mineru-pdf2md library.
#[derive(Debug, Error)]
pub enum ProcessError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium or point PDFIUM_LIB_PATH at the directory that contains it,\n\
or use the pure-Rust parser with --backend lopdf.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The layout engine process could not be started or exited non-zero.
    #[error("Layout engine '{engine}' failed: {detail}")]
    EngineFailed { engine: String, detail: String },

    /// The engine reported success but one of its outputs could not be read.
    #[error("Could not read engine output '{path}': {detail}")]
    EngineOutputUnreadable { path: PathBuf, detail: String },

    // ── Batch errors ──────────────────────────────────────────────────────
    /// The combined upload exceeds the deployment ceiling.
    #[error(
        "Total upload size {total_mb:.2} MB exceeds the {limit_mb} MB limit\n\
Remove some files or split the batch."
    )]
    UploadTooLarge { total_mb: f64, limit_mb: u64 },

    /// The batch had no files in it.
    #[error("No files to process")]
    EmptyBatch,

    /// The temporary workspace could not be created or populated.
    #[error("Temporary workspace error at '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a rendition file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or settings validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProcessError {
    /// Render the error's `source()` chain, one cause per line.
    ///
    /// Used as the diagnostic trace attached to failed results.
    pub fn trace(&self) -> String {
        let mut out = format!("{self:?}");
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\nCaused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}
