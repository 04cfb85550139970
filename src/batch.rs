//! Batch controller: many uploads, one temporary workspace, one report.
//!
//! ```text
//! uploads ──▶ size ceiling ──▶ workspace (mineru_*) ──▶ Processor × N ──▶ BatchReport
//!                                 input/{i}/{name}        sequential        artifacts
//!                                 output/{stem}
//! ```
//!
//! Files are processed one at a time in upload order. The workspace is a
//! [`tempfile::TempDir`], so it is removed when the batch returns, errors
//! or unwinds.

use crate::config::{OutputFormats, ProcessingConfig, ProcessorSettings};
use crate::error::ProcessError;
use crate::output::{Artifact, ProcessingResult};
use crate::pipeline::input::UploadedFile;
use crate::process::Processor;
use crate::progress::{ProgressReporter, SharedObserver};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{info, warn};

/// Prefix of every batch workspace directory.
pub const WORKSPACE_PREFIX: &str = "mineru_";

/// Scoped directory tree for one batch.
///
/// Dropping it deletes everything underneath.
pub struct TemporaryWorkspace {
    dir: TempDir,
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl TemporaryWorkspace {
    /// Create `mineru_*/input` and `mineru_*/output` under `root`, or under
    /// the system temp directory when `root` is `None`.
    pub fn create(root: Option<&Path>) -> Result<Self, ProcessError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|source| ProcessError::Workspace {
            path: root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            source,
        })?;

        let input_dir = dir.path().join("input");
        let output_dir = dir.path().join("output");
        for d in [&input_dir, &output_dir] {
            std::fs::create_dir_all(d).map_err(|source| ProcessError::Workspace {
                path: d.clone(),
                source,
            })?;
        }

        Ok(Self {
            dir,
            input_dir,
            output_dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Store an upload at `input/{index}/{name}` and return its path.
    pub async fn store(&self, index: usize, file: &UploadedFile) -> Result<PathBuf, ProcessError> {
        let dir = self.input_dir.join(index.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ProcessError::Workspace {
                path: dir.clone(),
                source,
            })?;
        let path = dir.join(file.safe_name());
        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|source| ProcessError::Workspace {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Output directory for one file: `output/{stem}`, or
    /// `output/{stem}_{index}` when an earlier upload already used the stem.
    pub fn output_dir_for(&self, index: usize, stem: &str) -> PathBuf {
        let dir = self.output_dir.join(stem);
        if dir.exists() {
            self.output_dir.join(format!("{stem}_{index}"))
        } else {
            dir
        }
    }

    /// Delete the workspace now, reporting any error.
    pub fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

/// Aggregated outcome of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// One result per upload, in upload order. Rendition paths point into
    /// the workspace, which no longer exists once the report is returned.
    pub results: Vec<ProcessingResult>,
    pub succeeded: usize,
    pub failed: usize,
    /// Where the (now deleted) workspace was.
    pub workspace: PathBuf,
}

impl BatchReport {
    /// `(file name, error message)` for every failed file.
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                (
                    r.file_name.as_deref().unwrap_or(""),
                    r.error.as_deref().unwrap_or("unknown error"),
                )
            })
            .collect()
    }

    /// Downloadable artifacts of every successful file, named
    /// `{original_stem}.{ext}`. When two successful uploads share a stem, the
    /// later one is named `{stem}_{index}` with its 1-based batch position.
    pub fn artifacts(&self, formats: &OutputFormats) -> Vec<Artifact> {
        let mut used = HashSet::new();
        let mut artifacts = Vec::new();
        for (i, r) in self.results.iter().enumerate().filter(|(_, r)| r.success) {
            let base = UploadedFile::new(r.file_name.clone().unwrap_or_default(), Vec::new()).stem();
            let mut stem = base.clone();
            let mut n = i + 1;
            while !used.insert(stem.clone()) {
                stem = format!("{base}_{n}");
                n += 1;
            }
            artifacts.extend(r.artifacts(&stem, formats));
        }
        artifacts
    }
}

/// Process a batch of uploads.
///
/// # Errors
/// Only batch-level problems are errors:
/// - [`ProcessError::EmptyBatch`] for no files
/// - [`ProcessError::UploadTooLarge`] when the combined size exceeds the
///   deployment ceiling (checked before anything is written)
/// - [`ProcessError::Workspace`] when the workspace cannot be created or
///   populated
///
/// Per-file failures are reported in [`BatchReport::results`].
pub async fn process_batch(
    processor: &Processor,
    settings: &ProcessorSettings,
    files: &[UploadedFile],
    config: &ProcessingConfig,
    observer: SharedObserver,
) -> Result<BatchReport, ProcessError> {
    if files.is_empty() {
        return Err(ProcessError::EmptyBatch);
    }

    let total_bytes: u64 = files.iter().map(UploadedFile::size).sum();
    let limit = settings.deployment.upload_limit_bytes();
    if total_bytes > limit {
        return Err(ProcessError::UploadTooLarge {
            total_mb: total_bytes as f64 / (1024.0 * 1024.0),
            limit_mb: settings.deployment.upload_limit_mb(),
        });
    }

    let total = files.len();
    info!("Processing batch of {} files ({} bytes)", total, total_bytes);
    observer.on_batch_start(total);

    let workspace = TemporaryWorkspace::create(settings.workspace_root.as_deref())?;
    let workspace_path = workspace.path().to_path_buf();

    let mut results = Vec::with_capacity(total);
    for (i, file) in files.iter().enumerate() {
        let index = i + 1;
        observer.on_file_start(index, total, &file.name);

        let pdf = workspace.store(index, file).await?;
        let output_dir = workspace.output_dir_for(index, &file.stem());
        let reporter = ProgressReporter::new(observer.clone());

        let mut result = processor
            .process_file(&pdf, &file.name, &output_dir, config, &reporter)
            .await;
        result.file_name = Some(file.name.clone());

        if result.success {
            info!("[{}/{}] {} processed", index, total, file.name);
        } else {
            warn!(
                "[{}/{}] {} failed: {}",
                index,
                total,
                file.name,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        observer.on_file_complete(index, total, &result);
        results.push(result);
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = total - succeeded;
    observer.on_batch_complete(succeeded, failed);

    if let Err(e) = workspace.close() {
        warn!("Could not remove workspace {}: {}", workspace_path.display(), e);
    }

    Ok(BatchReport {
        results,
        succeeded,
        failed,
        workspace: workspace_path,
    })
}
