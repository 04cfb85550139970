//! # mineru-pdf2md
//!
//! Convert uploaded PDF files into Markdown, HTML, plain text and JSON.
//!
//! When the MinerU layout engine is installed it does the heavy lifting
//! (layout analysis, tables, formulas); when it is not, the crate falls back
//! to a remote processing service or to plain per-page text extraction.
//!
//! ## Pipeline Overview
//!
//! ```text
//! uploads
//!  │
//!  ├─ 1. Batch     size ceiling, temporary workspace (mineru_*)
//!  ├─ 2. Strategy  engine │ demo │ remote API │ basic (picked once)
//!  ├─ 3. Parse     MinerU subprocess, HTTP upload, or pdfium/lopdf text
//!  ├─ 4. Render    Markdown → HTML / text / JSON
//!  └─ 5. Report    per-file results, stats, downloadable artifacts
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mineru_pdf2md::{process_batch, NoopProgress, ProcessingConfig, Processor,
//!                     ProcessorSettings, UploadedFile, OutputFormats};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // VERCEL / MINERU_API_URL / MINERU_BIN are read here
//!     let settings = ProcessorSettings::from_env();
//!     let processor = Processor::from_settings(&settings).await?;
//!
//!     let upload = UploadedFile::from_path("document.pdf").await?;
//!     let report = process_batch(
//!         &processor,
//!         &settings,
//!         &[upload],
//!         &ProcessingConfig::default(),
//!         Arc::new(NoopProgress),
//!     )
//!     .await?;
//!
//!     for artifact in report.artifacts(&OutputFormats::default()) {
//!         println!("{} ({} bytes)", artifact.file_name, artifact.content.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature    | Default | Description |
//! |------------|---------|-------------|
//! | `cli`      | on      | Enables the `mineru-pdf` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `markdown` | on      | CommonMark HTML rendering via pulldown-cmark; off falls back to a line-based renderer |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! mineru-pdf2md = { version = "0.1", default-features = false, features = ["markdown"] }
//! ```
//!
//! ## Text extraction backends
//!
//! | Backend  | Needs                    | Notes |
//! |----------|--------------------------|-------|
//! | `pdfium` | libpdfium at runtime     | Best text order; `PDFIUM_LIB_PATH` selects the library directory |
//! | `lopdf`  | nothing                  | Pure Rust |
//! | `auto`   | nothing                  | pdfium when it binds, lopdf otherwise (default) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{process_batch, BatchReport, TemporaryWorkspace};
pub use config::{
    Deployment, Language, OutputFormat, OutputFormats, ParseMethod, ProcessingConfig,
    ProcessingConfigBuilder, ProcessingMode, ProcessorSettings,
};
pub use error::ProcessError;
pub use output::{Artifact, Method, ProcessingResult, ProcessingStats, Renditions};
pub use pipeline::engine::{EngineArtifacts, LayoutEngine, MineruCli};
pub use pipeline::extract::ExtractorBackend;
pub use pipeline::input::UploadedFile;
pub use process::Processor;
pub use progress::{
    ChannelObserver, NoopProgress, ProgressEvent, ProgressObserver, ProgressReporter,
    SharedObserver,
};
