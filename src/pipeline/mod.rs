//! Processing stages used by the [`crate::process::Processor`] branches.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//!                    ┌──▶ engine ──────────────┐
//! input ──▶ (strategy)──▶ remote ──(fallback)─┐ ├──▶ render ──▶ ProcessingResult
//! (path/URL/bytes)   ├──▶ extract ◀───────────┘ │   (html/txt/json)
//!                    └──▶ demo ─────────────────┘
//! ```
//!
//! 1. [`input`]: validate uploads (`%PDF` magic), resolve paths and URLs
//! 2. [`extract`]: per-page text via pdfium or lopdf; runs in
//!    `spawn_blocking`
//! 3. [`engine`]: run the external layout engine and find its outputs
//! 4. [`remote`]: multipart upload to a remote processing service
//! 5. [`demo`]: fixed illustrative document when the engine is missing
//! 6. [`render`]: Markdown → HTML / plain text / JSON, and rendition files

pub mod demo;
pub mod engine;
pub mod extract;
pub mod input;
pub mod remote;
pub mod render;
