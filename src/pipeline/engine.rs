//! Layout engine adapter.
//!
//! [`LayoutEngine`] is the capability the processing façade is handed when a
//! layout engine is installed. [`MineruCli`] implements it by running the
//! MinerU command-line tool as a subprocess and locating the files it wrote.

use crate::config::ProcessingConfig;
use crate::error::ProcessError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Number of stderr bytes kept in an [`ProcessError::EngineFailed`] message.
const STDERR_TAIL_BYTES: usize = 2000;

/// Files produced by one engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineArtifacts {
    pub markdown: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

/// An external document-layout engine.
#[async_trait]
pub trait LayoutEngine: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Parse `pdf`, writing outputs under `output_dir`.
    async fn parse(
        &self,
        pdf: &Path,
        output_dir: &Path,
        config: &ProcessingConfig,
    ) -> Result<EngineArtifacts, ProcessError>;
}

/// The MinerU command-line tool.
#[derive(Debug, Clone)]
pub struct MineruCli {
    program: PathBuf,
}

impl MineruCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Probe for the executable by running `{program} --version`.
    ///
    /// Returns `None` when it cannot be started or exits non-zero.
    pub async fn detect(program: impl Into<PathBuf>) -> Option<Self> {
        let program = program.into();
        let status = Command::new(&program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(s) if s.success() => {
                info!("Layout engine found: {}", program.display());
                Some(Self { program })
            }
            Ok(s) => {
                debug!("{} --version exited with {}", program.display(), s);
                None
            }
            Err(e) => {
                debug!("Layout engine {} not available: {}", program.display(), e);
                None
            }
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn args(pdf: &Path, output_dir: &Path, config: &ProcessingConfig) -> Vec<String> {
        vec![
            "-p".into(),
            pdf.display().to_string(),
            "-o".into(),
            output_dir.display().to_string(),
            "-m".into(),
            config.parse_method.as_str().into(),
            "-l".into(),
            config.language.engine_code().into(),
            "-f".into(),
            config.formula_enable.to_string(),
            "-t".into(),
            config.table_enable.to_string(),
        ]
    }
}

#[async_trait]
impl LayoutEngine for MineruCli {
    fn name(&self) -> &str {
        "mineru"
    }

    async fn parse(
        &self,
        pdf: &Path,
        output_dir: &Path,
        config: &ProcessingConfig,
    ) -> Result<EngineArtifacts, ProcessError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| ProcessError::OutputWriteFailed {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let args = Self::args(pdf, output_dir, config);
        debug!("Running {} {}", self.program.display(), args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ProcessError::EngineFailed {
                engine: self.name().to_string(),
                detail: format!("could not start {}: {e}", self.program.display()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessError::EngineFailed {
                engine: self.name().to_string(),
                detail: format!("{}\n{}", output.status, tail(&stderr, STDERR_TAIL_BYTES)),
            });
        }

        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let artifacts = locate_artifacts(output_dir, &stem);
        if artifacts.markdown.is_none() {
            warn!("{} produced no Markdown under {}", self.name(), output_dir.display());
        }
        Ok(artifacts)
    }
}

/// Find the Markdown and JSON files an engine wrote under `output_dir`.
///
/// `{stem}.md` and `{stem}_content_list.json` win; otherwise the first
/// `.md` / `.json` in a name-sorted walk of the tree is taken.
pub fn locate_artifacts(output_dir: &Path, stem: &str) -> EngineArtifacts {
    let preferred_md = format!("{stem}.md");
    let preferred_json = format!("{stem}_content_list.json");

    let mut artifacts = EngineArtifacts::default();
    let mut first_md = None;
    let mut first_json = None;

    let files = WalkDir::new(output_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());

    for entry in files {
        let name = entry.file_name().to_string_lossy();
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("md") => {
                if name == preferred_md.as_str() && artifacts.markdown.is_none() {
                    artifacts.markdown = Some(path.to_path_buf());
                }
                first_md.get_or_insert_with(|| path.to_path_buf());
            }
            Some("json") => {
                if name == preferred_json.as_str() && artifacts.json.is_none() {
                    artifacts.json = Some(path.to_path_buf());
                }
                first_json.get_or_insert_with(|| path.to_path_buf());
            }
            _ => {}
        }
    }

    if artifacts.markdown.is_none() {
        artifacts.markdown = first_md;
    }
    if artifacts.json.is_none() {
        artifacts.json = first_json;
    }
    artifacts
}

/// Last `max` bytes of `s`, on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
