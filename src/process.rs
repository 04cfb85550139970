//! The processing façade: one PDF in, one [`ProcessingResult`] out.
//!
//! A [`Processor`] picks its strategy once, at construction, from the
//! configured [`ProcessingMode`] and whether a layout engine is available:
//!
//! | mode     | engine | API URL | strategy                   |
//! |----------|--------|---------|----------------------------|
//! | `basic`  | any    | any     | basic                      |
//! | `engine` | yes    | any     | engine                     |
//! | `engine` | no     | any     | demo                       |
//! | `api`    | any    | yes     | remote, falls back to basic|
//! | `auto`   | yes    | any     | engine                     |
//! | `auto`   | no     | yes     | remote, falls back to basic|
//! | `auto`   | no     | no      | basic                      |
//!
//! [`Processor::process_file`] never returns an error: failures and panics
//! inside a branch become a failed result with a diagnostic trace.

use crate::config::{ProcessingConfig, ProcessingMode, ProcessorSettings};
use crate::error::ProcessError;
use crate::output::{Method, ProcessingResult, ProcessingStats, Renditions};
use crate::pipeline::demo::{demo_json, demo_markdown, DEMO_STATS};
use crate::pipeline::engine::{LayoutEngine, MineruCli};
use crate::pipeline::extract::{self, ExtractorBackend};
use crate::pipeline::input::validate_pdf;
use crate::pipeline::remote::RemoteClient;
use crate::pipeline::render::{self, DocumentInfo};
use crate::progress::ProgressReporter;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Markdown used when the engine ran but wrote no Markdown file.
const ENGINE_PLACEHOLDER_MARKDOWN: &str =
    "# Processing Result\n\nThe layout engine did not produce any Markdown content.\n";

/// Branch selected for a [`Processor`].
enum Strategy {
    Engine(Arc<dyn LayoutEngine>),
    Demo,
    Remote(RemoteClient),
    Basic,
}

/// Processes single PDFs with a strategy fixed at construction.
pub struct Processor {
    strategy: Strategy,
    extractor: ExtractorBackend,
}

impl Processor {
    /// Build a processor from settings and an optional engine capability.
    ///
    /// # Errors
    /// [`ProcessError::InvalidConfig`] when the settings are inconsistent,
    /// e.g. `api` mode without an API URL.
    pub fn new(
        settings: &ProcessorSettings,
        engine: Option<Arc<dyn LayoutEngine>>,
    ) -> Result<Self, ProcessError> {
        settings.validate()?;

        let strategy = match (settings.mode, engine) {
            (ProcessingMode::Basic, _) => Strategy::Basic,
            (ProcessingMode::Engine, Some(engine)) => Strategy::Engine(engine),
            (ProcessingMode::Engine, None) => Strategy::Demo,
            (ProcessingMode::Api, _) => Strategy::Remote(remote_client(settings)?),
            (ProcessingMode::Auto, Some(engine)) => Strategy::Engine(engine),
            (ProcessingMode::Auto, None) if settings.api_base_url.is_some() => {
                Strategy::Remote(remote_client(settings)?)
            }
            (ProcessingMode::Auto, None) => Strategy::Basic,
        };

        let processor = Self {
            strategy,
            extractor: settings.extractor,
        };
        info!("Processing strategy: {}", processor.strategy_name());
        Ok(processor)
    }

    /// Build a processor, probing for the MinerU executable named in the
    /// settings when the mode can use it.
    pub async fn from_settings(settings: &ProcessorSettings) -> Result<Self, ProcessError> {
        let engine: Option<Arc<dyn LayoutEngine>> = match settings.mode {
            ProcessingMode::Engine | ProcessingMode::Auto => MineruCli::detect(&settings.engine_bin)
                .await
                .map(|cli| Arc::new(cli) as Arc<dyn LayoutEngine>),
            ProcessingMode::Basic | ProcessingMode::Api => None,
        };
        Self::new(settings, engine)
    }

    /// Name of the selected strategy: `engine`, `demo`, `remote` or `basic`.
    pub fn strategy_name(&self) -> &'static str {
        match self.strategy {
            Strategy::Engine(_) => "engine",
            Strategy::Demo => "demo",
            Strategy::Remote(_) => "remote",
            Strategy::Basic => "basic",
        }
    }

    /// Process one PDF.
    ///
    /// # Arguments
    /// * `pdf`: the PDF on disk
    /// * `file_name`: original upload name (used for titles and the remote upload)
    /// * `output_dir`: where the engine and demo branches write rendition files
    /// * `config`: per-run options
    /// * `progress`: per-file progress handle
    pub async fn process_file(
        &self,
        pdf: &Path,
        file_name: &str,
        output_dir: &Path,
        config: &ProcessingConfig,
        progress: &ProgressReporter,
    ) -> ProcessingResult {
        let start = Instant::now();
        progress.report(0.1, "Initialising processor...");

        let run = self.run(pdf, file_name, output_dir, config, progress, start);
        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(result)) => {
                debug!(
                    "Processed {} in {:.2}s via {}",
                    file_name,
                    start.elapsed().as_secs_f64(),
                    result.method.map(|m| m.as_str()).unwrap_or("unknown")
                );
                result
            }
            Ok(Err(e)) => {
                error!("Processing {} failed: {}", file_name, e);
                progress.fail(format!("Processing failed: {e}"));
                ProcessingResult::failed(e.to_string(), e.trace())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Processing {} panicked: {}", file_name, message);
                progress.fail("Processing failed");
                ProcessingResult::failed(
                    format!("Internal error: {message}"),
                    format!("panic while processing '{file_name}': {message}"),
                )
            }
        }
    }

    async fn run(
        &self,
        pdf: &Path,
        file_name: &str,
        output_dir: &Path,
        config: &ProcessingConfig,
        progress: &ProgressReporter,
        start: Instant,
    ) -> Result<ProcessingResult, ProcessError> {
        let stem = file_stem(file_name);
        match &self.strategy {
            Strategy::Demo => run_demo(&stem, output_dir, progress).await,
            Strategy::Engine(engine) => {
                validate_pdf(pdf)?;
                run_engine(engine.as_ref(), pdf, &stem, output_dir, config, progress, start).await
            }
            Strategy::Remote(client) => {
                let file_size = validate_pdf(pdf)?;
                match client.process(pdf, file_name, config, progress).await {
                    Some(result)
                        if result.success && result.outputs.markdown_content.trim().is_empty() =>
                    {
                        warn!("Remote API returned no Markdown for {}", file_name);
                    }
                    Some(result) => {
                        let result = complete_remote(result, pdf, &stem, file_size, start).await?;
                        progress.report(1.0, "Processing complete");
                        return Ok(result);
                    }
                    None => {}
                }
                progress.report(0.2, "API unavailable, using basic extraction...");
                run_basic(pdf, &stem, file_size, self.extractor, progress, start).await
            }
            Strategy::Basic => {
                let file_size = validate_pdf(pdf)?;
                run_basic(pdf, &stem, file_size, self.extractor, progress, start).await
            }
        }
    }
}

fn remote_client(settings: &ProcessorSettings) -> Result<RemoteClient, ProcessError> {
    let url = settings
        .api_base_url
        .as_deref()
        .ok_or_else(|| ProcessError::InvalidConfig("no API base URL configured".into()))?;
    RemoteClient::new(url, settings.api_timeout_secs)
}

// ── Remote branch ────────────────────────────────────────────────────────────

/// Fill the renditions a remote service left out, all derived from its
/// Markdown. Failed results pass through untouched.
async fn complete_remote(
    mut result: ProcessingResult,
    pdf: &Path,
    stem: &str,
    file_size: u64,
    start: Instant,
) -> Result<ProcessingResult, ProcessError> {
    if !result.success {
        return Ok(result);
    }
    let method = *result.method.get_or_insert(Method::Mineru);
    if result.stats.total_pages == 0 {
        result.stats = ProcessingStats::estimate(&result.outputs.markdown_content, page_count(pdf).await);
    }

    let outputs = &mut result.outputs;
    if outputs.text_content.trim().is_empty() {
        outputs.text_content = render::markdown_to_text(&outputs.markdown_content);
    }
    if !outputs.html_content.contains("<html") {
        outputs.html_content = render::markdown_to_html(&outputs.markdown_content);
    }
    if outputs.json_content.trim().is_empty() {
        outputs.json_content = render::document_json(
            &DocumentInfo {
                title: stem,
                pages: result.stats.total_pages,
                method,
                processor: None,
                file_size,
                processing_time: start.elapsed().as_secs_f64(),
            },
            &outputs.text_content,
            &outputs.markdown_content,
        )?;
    }
    Ok(result)
}

// ── Basic branch ─────────────────────────────────────────────────────────────

async fn run_basic(
    pdf: &Path,
    stem: &str,
    file_size: u64,
    backend: ExtractorBackend,
    progress: &ProgressReporter,
    start: Instant,
) -> Result<ProcessingResult, ProcessError> {
    progress.report(0.2, "Opening PDF...");
    let document = extract::extract_document(pdf, backend, progress).await?;

    progress.report(0.9, "Generating output files...");
    let markdown = document.markdown();
    let text = document.text();
    let html = render::markdown_to_html(&markdown);
    let json = render::document_json(
        &DocumentInfo {
            title: stem,
            pages: document.total_pages,
            method: Method::Basic,
            processor: Some(document.processor),
            file_size,
            processing_time: start.elapsed().as_secs_f64(),
        },
        &text,
        &markdown,
    )?;

    let stats = ProcessingStats {
        total_pages: document.total_pages,
        text_blocks: document.pages_with_text(),
        tables: 0,
        formulas: 0,
    };

    progress.report(1.0, "Processing complete");
    Ok(ProcessingResult::succeeded(
        Renditions {
            markdown_content: markdown,
            html_content: html,
            text_content: text,
            json_content: json,
            ..Default::default()
        },
        stats,
        Method::Basic,
    ))
}

// ── Engine branch ────────────────────────────────────────────────────────────

async fn run_engine(
    engine: &dyn LayoutEngine,
    pdf: &Path,
    stem: &str,
    output_dir: &Path,
    config: &ProcessingConfig,
    progress: &ProgressReporter,
    start: Instant,
) -> Result<ProcessingResult, ProcessError> {
    ensure_dir(output_dir).await?;
    progress.report(0.2, format!("Configuring {}...", engine.name()));

    progress.report(0.3, "Parsing PDF...");
    let artifacts = engine.parse(pdf, output_dir, config).await?;

    progress.report(0.8, "Generating output files...");
    let mut outputs = Renditions::default();

    let markdown = match &artifacts.markdown {
        Some(path) => read_engine_output(path).await?,
        None => String::new(),
    };
    if markdown.trim().is_empty() {
        warn!("No Markdown from {}, using placeholder", engine.name());
        outputs.markdown_content = ENGINE_PLACEHOLDER_MARKDOWN.to_string();
    } else {
        outputs.markdown_content = markdown;
        outputs.markdown_path = artifacts.markdown.clone();
    }

    let total_pages = page_count(pdf).await;

    let engine_json = match &artifacts.json {
        Some(path) => {
            let raw = read_engine_output(path).await?;
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value) => serde_json::to_string_pretty(&value).ok(),
                Err(e) => {
                    warn!("Engine JSON {} is not valid JSON: {}", path.display(), e);
                    None
                }
            }
        }
        None => None,
    };

    outputs.text_content = render::markdown_to_text(&outputs.markdown_content);
    match engine_json {
        Some(json) => {
            outputs.json_content = json;
            outputs.json_path = artifacts.json.clone();
        }
        None => {
            let file_size = tokio::fs::metadata(pdf).await.map(|m| m.len()).unwrap_or(0);
            outputs.json_content = render::document_json(
                &DocumentInfo {
                    title: stem,
                    pages: total_pages,
                    method: Method::Mineru,
                    processor: None,
                    file_size,
                    processing_time: start.elapsed().as_secs_f64(),
                },
                &outputs.text_content,
                &outputs.markdown_content,
            )?;
        }
    }

    progress.report(0.9, "Rendering HTML and text...");
    outputs.html_content = render::markdown_to_html(&outputs.markdown_content);
    outputs.html_path =
        Some(render::write_rendition(output_dir, stem, "html", &outputs.html_content).await?);
    outputs.text_path =
        Some(render::write_rendition(output_dir, stem, "txt", &outputs.text_content).await?);

    let stats = ProcessingStats::estimate(&outputs.markdown_content, total_pages);

    progress.report(1.0, "Processing complete");
    Ok(ProcessingResult::succeeded(outputs, stats, Method::Mineru))
}

async fn read_engine_output(path: &Path) -> Result<String, ProcessError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProcessError::EngineOutputUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
}

/// Page count of `pdf`, or 1 when it cannot be determined.
async fn page_count(pdf: &Path) -> usize {
    let path = pdf.to_path_buf();
    tokio::task::spawn_blocking(move || extract::count_pages(&path))
        .await
        .ok()
        .flatten()
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

// ── Demo branch ──────────────────────────────────────────────────────────────

async fn run_demo(
    stem: &str,
    output_dir: &Path,
    progress: &ProgressReporter,
) -> Result<ProcessingResult, ProcessError> {
    ensure_dir(output_dir).await?;
    progress.report(0.2, "Layout engine not installed, generating demo result...");
    progress.report(0.3, "Generating demo content...");

    let markdown = demo_markdown(stem);
    let html = render::markdown_to_html(&markdown);
    let text = render::markdown_to_text(&markdown);
    let json = demo_json(stem);

    progress.report(0.6, "Writing output files...");
    let outputs = Renditions {
        markdown_path: Some(render::write_rendition(output_dir, stem, "md", &markdown).await?),
        html_path: Some(render::write_rendition(output_dir, stem, "html", &html).await?),
        text_path: Some(render::write_rendition(output_dir, stem, "txt", &text).await?),
        json_path: Some(render::write_rendition(output_dir, stem, "json", &json).await?),
        markdown_content: markdown,
        html_content: html,
        text_content: text,
        json_content: json,
    };

    progress.report(1.0, "Demo result ready");
    Ok(ProcessingResult::succeeded(outputs, DEMO_STATS, Method::Demo))
}

// ── Helpers ──────────────────────────────────────────────────────────────────

async fn ensure_dir(dir: &Path) -> Result<(), ProcessError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| ProcessError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source,
        })
}

/// Stem of an upload name: `dir/report.pdf` → `report`.
fn file_stem(file_name: &str) -> String {
    let safe = crate::pipeline::input::sanitize_file_name(file_name);
    Path::new(&safe)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::engine::EngineArtifacts;
    use async_trait::async_trait;
    use std::path::PathBuf;

    /// Writes `{stem}/auto/{stem}.md` like MinerU does.
    struct FakeEngine {
        markdown: Option<&'static str>,
    }

    #[async_trait]
    impl LayoutEngine for FakeEngine {
        fn name(&self) -> &str {
            "fake"
        }

        async fn parse(
            &self,
            pdf: &Path,
            output_dir: &Path,
            _config: &ProcessingConfig,
        ) -> Result<EngineArtifacts, ProcessError> {
            let stem = pdf.file_stem().unwrap().to_string_lossy().into_owned();
            let dir = output_dir.join(&stem).join("auto");
            std::fs::create_dir_all(&dir).unwrap();
            let mut artifacts = EngineArtifacts::default();
            if let Some(md) = self.markdown {
                let path = dir.join(format!("{stem}.md"));
                std::fs::write(&path, md).unwrap();
                artifacts.markdown = Some(path);
            }
            Ok(artifacts)
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl LayoutEngine for FailingEngine {
        fn name(&self) -> &str {
            "failing"
        }

        async fn parse(
            &self,
            _pdf: &Path,
            _output_dir: &Path,
            _config: &ProcessingConfig,
        ) -> Result<EngineArtifacts, ProcessError> {
            Err(ProcessError::EngineFailed {
                engine: "failing".into(),
                detail: "boom".into(),
            })
        }
    }

    struct PanickingEngine;

    #[async_trait]
    impl LayoutEngine for PanickingEngine {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn parse(
            &self,
            _pdf: &Path,
            _output_dir: &Path,
            _config: &ProcessingConfig,
        ) -> Result<EngineArtifacts, ProcessError> {
            panic!("engine exploded");
        }
    }

    fn settings(mode: ProcessingMode, url: Option<&str>) -> ProcessorSettings {
        ProcessorSettings {
            mode,
            api_base_url: url.map(str::to_string),
            extractor: ExtractorBackend::Lopdf,
            ..Default::default()
        }
    }

    fn engine(md: Option<&'static str>) -> Option<Arc<dyn LayoutEngine>> {
        Some(Arc::new(FakeEngine { markdown: md }))
    }

    fn stub_pdf(dir: &Path) -> PathBuf {
        let path = dir.join("paper.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%stub\n").unwrap();
        path
    }

    #[test]
    fn strategy_table() {
        let url = Some("http://localhost:9");
        let cases = [
            (ProcessingMode::Basic, true, url, "basic"),
            (ProcessingMode::Engine, true, None, "engine"),
            (ProcessingMode::Engine, false, None, "demo"),
            (ProcessingMode::Api, false, url, "remote"),
            (ProcessingMode::Api, true, url, "remote"),
            (ProcessingMode::Auto, true, url, "engine"),
            (ProcessingMode::Auto, false, url, "remote"),
            (ProcessingMode::Auto, false, None, "basic"),
        ];
        for (mode, has_engine, url, expected) in cases {
            let e = if has_engine { engine(Some("# x")) } else { None };
            let p = Processor::new(&settings(mode, url), e).unwrap();
            assert_eq!(p.strategy_name(), expected, "mode {mode:?}, engine {has_engine}");
        }
    }

    #[test]
    fn api_mode_without_url_is_config_error() {
        let err = Processor::new(&settings(ProcessingMode::Api, None), None).err().unwrap();
        assert!(matches!(err, ProcessError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn engine_branch_backfills_html_text_json() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = stub_pdf(dir.path());
        let out = dir.path().join("out");
        let md = "# Hello\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\nInline $x$ here.";

        let p = Processor::new(&settings(ProcessingMode::Engine, None), engine(Some(md))).unwrap();
        let reporter = ProgressReporter::silent();
        let r = p
            .process_file(&pdf, "paper.pdf", &out, &ProcessingConfig::default(), &reporter)
            .await;

        assert!(r.success, "{:?}", r.error);
        assert_eq!(r.method, Some(Method::Mineru));
        assert_eq!(r.outputs.markdown_content, md);
        assert!(r.outputs.html_content.contains("<html>"));
        assert!(r.outputs.text_content.starts_with("Hello"));
        assert!(out.join("paper.html").exists());
        assert!(out.join("paper.txt").exists());
        assert_eq!(r.outputs.html_path, Some(out.join("paper.html")));

        let json: serde_json::Value = serde_json::from_str(&r.outputs.json_content).unwrap();
        assert_eq!(json["document"]["method"], "mineru");

        assert_eq!(r.stats.total_pages, 1);
        assert_eq!(r.stats.tables, 1);
        assert_eq!(r.stats.formulas, 1);
        assert_eq!(reporter.current(), 1.0);
    }

    #[tokio::test]
    async fn engine_without_markdown_uses_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = stub_pdf(dir.path());
        let p = Processor::new(&settings(ProcessingMode::Engine, None), engine(None)).unwrap();
        let r = p
            .process_file(
                &pdf,
                "paper.pdf",
                &dir.path().join("out"),
                &ProcessingConfig::default(),
                &ProgressReporter::silent(),
            )
            .await;
        assert!(r.success);
        assert_eq!(r.outputs.markdown_content, ENGINE_PLACEHOLDER_MARKDOWN);
        assert!(r.outputs.markdown_path.is_none());
    }

    #[tokio::test]
    async fn engine_failure_fails_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = stub_pdf(dir.path());
        let p = Processor::new(
            &settings(ProcessingMode::Engine, None),
            Some(Arc::new(FailingEngine)),
        )
        .unwrap();
        let reporter = ProgressReporter::silent();
        let r = p
            .process_file(&pdf, "paper.pdf", dir.path(), &ProcessingConfig::default(), &reporter)
            .await;
        assert!(!r.success);
        assert!(r.error.as_deref().unwrap().contains("boom"));
        assert!(r.traceback.as_deref().unwrap().contains("EngineFailed"));
        assert_eq!(reporter.current(), 1.0);
    }

    #[tokio::test]
    async fn panic_becomes_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = stub_pdf(dir.path());
        let p = Processor::new(
            &settings(ProcessingMode::Engine, None),
            Some(Arc::new(PanickingEngine)),
        )
        .unwrap();
        let r = p
            .process_file(
                &pdf,
                "paper.pdf",
                dir.path(),
                &ProcessingConfig::default(),
                &ProgressReporter::silent(),
            )
            .await;
        assert!(!r.success);
        assert!(r.traceback.as_deref().unwrap().contains("engine exploded"));
    }

    #[tokio::test]
    async fn demo_branch_writes_four_files() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = stub_pdf(dir.path());
        let out = dir.path().join("out");
        let p = Processor::new(&settings(ProcessingMode::Engine, None), None).unwrap();
        let r = p
            .process_file(&pdf, "paper.pdf", &out, &ProcessingConfig::default(), &ProgressReporter::silent())
            .await;

        assert!(r.success);
        assert_eq!(r.method, Some(Method::Demo));
        assert_eq!(r.stats, DEMO_STATS);
        for ext in ["md", "html", "txt", "json"] {
            assert!(out.join(format!("paper.{ext}")).exists(), "missing paper.{ext}");
        }
        assert!(r.outputs.markdown_content.starts_with("# paper - Demo Result"));
    }

    #[tokio::test]
    async fn basic_branch_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"GIF89a").unwrap();
        let p = Processor::new(&settings(ProcessingMode::Basic, None), None).unwrap();
        let r = p
            .process_file(&path, "fake.pdf", dir.path(), &ProcessingConfig::default(), &ProgressReporter::silent())
            .await;
        assert!(!r.success);
        assert!(r.error.as_deref().unwrap().contains("not a valid PDF"));
    }

    #[test]
    fn stems() {
        assert_eq!(file_stem("report.pdf"), "report");
        assert_eq!(file_stem("a/b/c.final.pdf"), "c.final");
        assert_eq!(file_stem(""), "document");
    }
}
