//! CLI binary for mineru-pdf2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ProcessorSettings` / `ProcessingConfig`, runs one batch and writes the
//! selected renditions to disk.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mineru_pdf2md::pipeline::input::resolve_input;
use mineru_pdf2md::{
    process_batch, BatchReport, ExtractorBackend, Language, NoopProgress, OutputFormats,
    ParseMethod, ProcessingConfig, ProcessingMode, ProcessingResult, Processor,
    ProcessorSettings, ProgressObserver, SharedObserver,
};
use once_cell::sync::Lazy;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

/// Colours only when stderr is a terminal and `NO_COLOR` is unset.
static COLOUR: Lazy<bool> =
    Lazy::new(|| io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none());

fn paint(code: &str, s: &str, enabled: bool) -> String {
    if enabled {
        format!("\x1b[{code}m{s}\x1b[0m")
    } else {
        s.to_string()
    }
}

fn green(s: &str) -> String {
    paint("32", s, *COLOUR)
}
fn red(s: &str) -> String {
    paint("31", s, *COLOUR)
}
fn dim(s: &str) -> String {
    paint("2", s, *COLOUR)
}
fn bold(s: &str) -> String {
    paint("1", s, *COLOUR)
}
fn cyan(s: &str) -> String {
    paint("36", s, *COLOUR)
}

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal observer: one bar reused for every file, 0–100 %.
struct CliProgress {
    bar: ProgressBar,
    started: std::sync::Mutex<Option<Instant>>,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: std::sync::Mutex::new(None),
        })
    }

    fn elapsed(&self) -> String {
        let secs = self
            .started
            .lock()
            .ok()
            .and_then(|g| g.map(|t| t.elapsed().as_secs_f64()))
            .unwrap_or(0.0);
        format!("{secs:.1}s")
    }
}

impl ProgressObserver for CliProgress {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} file(s)…"))
        ));
    }

    fn on_file_start(&self, index: usize, total: usize, file_name: &str) {
        if let Ok(mut g) = self.started.lock() {
            *g = Some(Instant::now());
        }
        self.bar.reset();
        self.bar.set_prefix(format!("[{index}/{total}] {file_name}"));
        self.bar.set_message("starting…");
    }

    fn on_progress(&self, fraction: f32, message: &str) {
        self.bar.set_position((fraction * 100.0).round() as u64);
        self.bar.set_message(message.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, result: &ProcessingResult) {
        let name = result.file_name.as_deref().unwrap_or("");
        if result.success {
            let method = result.method.map(|m| m.as_str()).unwrap_or("?");
            self.bar.println(format!(
                "  {} {:>3}/{:<3} {}  {}  {}",
                green("✓"),
                index,
                total,
                name,
                dim(&format!("{} pages via {method}", result.stats.total_pages)),
                dim(&self.elapsed()),
            ));
        } else {
            let error = result.error.as_deref().unwrap_or("unknown error");
            let first_line = error.lines().next().unwrap_or(error);
            self.bar.println(format!(
                "  {} {:>3}/{:<3} {}  {}  {}",
                red("✗"),
                index,
                total,
                name,
                red(first_line),
                dim(&self.elapsed()),
            ));
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize) {
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!("{} {} file(s) processed", green("✔"), bold(&succeeded.to_string()));
        } else {
            eprintln!(
                "{} {}/{} file(s) processed  ({} failed)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                succeeded + failed,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one file into the current directory (md, html, txt)
  mineru-pdf report.pdf

  # Several files, all four formats, into ./out
  mineru-pdf a.pdf b.pdf --formats all -o out

  # Force plain text extraction with the pure-Rust parser
  mineru-pdf --mode basic --backend lopdf scan.pdf

  # English document, OCR, no formula recognition
  mineru-pdf --lang en --method ocr --no-formula paper.pdf

  # Use a remote processing service
  mineru-pdf --mode api --api-url http://mineru.local:8000 paper.pdf

  # Convert from URL and print the batch report as JSON
  mineru-pdf https://arxiv.org/pdf/1706.03762 --json > report.json

STRATEGIES (--mode):
  auto     MinerU if installed, else remote API if configured, else basic
  basic    per-page text extraction only
  engine   MinerU; a demo document is produced when it is not installed
  api      remote API; falls back to basic when the service is unavailable

ENVIRONMENT VARIABLES:
  MINERU_API_URL     Remote processing service base URL
  MINERU_BIN         MinerU executable (default: mineru)
  VERCEL             Set to 1 for the 50 MB serverless upload ceiling
  PDFIUM_LIB_PATH    Directory containing libpdfium
  RUST_LOG           Log filter, overrides -v / -q
"#;

/// Convert PDF files to Markdown, HTML, plain text and JSON.
#[derive(Parser, Debug)]
#[command(
    name = "mineru-pdf",
    version,
    about = "Convert PDF files to Markdown, HTML, text and JSON",
    long_about = "Convert PDF documents (local files or URLs) to Markdown, HTML, plain text and \
JSON. Uses the MinerU layout engine when installed, a remote processing service when \
configured, and plain per-page text extraction otherwise.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Directory the renditions are written to.
    #[arg(short, long, env = "MINERU_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Processing strategy.
    #[arg(long, env = "MINERU_MODE", value_enum, default_value = "auto")]
    mode: ModeArg,

    /// Remote processing service base URL.
    #[arg(long, env = "MINERU_API_URL")]
    api_url: Option<String>,

    /// Remote API timeout in seconds.
    #[arg(long, env = "MINERU_API_TIMEOUT", default_value_t = mineru_pdf2md::config::DEFAULT_API_TIMEOUT_SECS)]
    api_timeout: u64,

    /// MinerU executable.
    #[arg(long, env = "MINERU_BIN", default_value = mineru_pdf2md::config::DEFAULT_ENGINE_BIN)]
    engine_bin: PathBuf,

    /// Document language.
    #[arg(long, env = "MINERU_LANG", value_enum, default_value = "ch")]
    lang: LangArg,

    /// Parse method handed to the layout engine.
    #[arg(long, env = "MINERU_METHOD", value_enum, default_value = "auto")]
    method: MethodArg,

    /// Disable formula recognition.
    #[arg(long, env = "MINERU_NO_FORMULA")]
    no_formula: bool,

    /// Disable table recognition.
    #[arg(long, env = "MINERU_NO_TABLE")]
    no_table: bool,

    /// Renditions to write: comma list of md, html, txt, json, or `all`.
    #[arg(long, env = "MINERU_FORMATS", default_value = "md,html,txt")]
    formats: OutputFormats,

    /// Text extraction backend for the basic strategy.
    #[arg(long, env = "MINERU_BACKEND", value_enum, default_value = "auto")]
    backend: BackendArg,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "MINERU_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "MINERU_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MINERU_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MINERU_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MINERU_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Auto,
    Basic,
    Engine,
    Api,
}

impl From<ModeArg> for ProcessingMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Auto => ProcessingMode::Auto,
            ModeArg::Basic => ProcessingMode::Basic,
            ModeArg::Engine => ProcessingMode::Engine,
            ModeArg::Api => ProcessingMode::Api,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LangArg {
    Ch,
    En,
    Auto,
}

impl From<LangArg> for Language {
    fn from(v: LangArg) -> Self {
        match v {
            LangArg::Ch => Language::Ch,
            LangArg::En => Language::En,
            LangArg::Auto => Language::Auto,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MethodArg {
    Auto,
    Ocr,
    Txt,
}

impl From<MethodArg> for ParseMethod {
    fn from(v: MethodArg) -> Self {
        match v {
            MethodArg::Auto => ParseMethod::Auto,
            MethodArg::Ocr => ParseMethod::Ocr,
            MethodArg::Txt => ParseMethod::Txt,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Auto,
    Pdfium,
    Lopdf,
}

impl From<BackendArg> for ExtractorBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Auto => ExtractorBackend::Auto,
            BackendArg::Pdfium => ExtractorBackend::Pdfium,
            BackendArg::Lopdf => ExtractorBackend::Lopdf,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build settings and processor ─────────────────────────────────────
    let settings = build_settings(&cli);
    let config = ProcessingConfig::builder()
        .language(cli.lang.into())
        .parse_method(cli.method.into())
        .formula_enable(!cli.no_formula)
        .table_enable(!cli.no_table)
        .build();

    let processor = Processor::from_settings(&settings)
        .await
        .context("Could not set up the processor")?;
    if !cli.quiet && !cli.json {
        eprintln!("{} strategy: {}", cyan("◆"), bold(processor.strategy_name()));
    }

    // ── Resolve inputs ───────────────────────────────────────────────────
    let mut uploads = Vec::with_capacity(cli.inputs.len());
    let mut unresolved = 0usize;
    for input in &cli.inputs {
        match resolve_input(input, cli.download_timeout).await {
            Ok(upload) => uploads.push(upload),
            Err(e) => {
                unresolved += 1;
                eprintln!("{} {}  {}", red("✗"), input, red(&e.to_string()));
            }
        }
    }
    if uploads.is_empty() {
        bail!("none of the {} input(s) could be read", cli.inputs.len());
    }

    // ── Run batch ────────────────────────────────────────────────────────
    let observer: SharedObserver = if show_progress {
        CliProgress::new() as SharedObserver
    } else {
        Arc::new(NoopProgress)
    };

    let started = Instant::now();
    let report = process_batch(&processor, &settings, &uploads, &config, observer)
        .await
        .context("Batch rejected")?;

    // ── Write artifacts ──────────────────────────────────────────────────
    let written = write_artifacts(&report, &cli.formats, &cli.output_dir).await?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report, &written, started.elapsed());
    }

    if report.succeeded == 0 {
        bail!(
            "all {} file(s) failed",
            report.results.len() + unresolved
        );
    }
    Ok(())
}

/// Map CLI args onto environment-derived settings.
fn build_settings(cli: &Cli) -> ProcessorSettings {
    let mut settings = ProcessorSettings::from_env();
    settings.mode = cli.mode.into();
    settings.api_base_url = cli
        .api_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    settings.api_timeout_secs = cli.api_timeout;
    settings.engine_bin = cli.engine_bin.clone();
    settings.extractor = cli.backend.into();
    settings
}

async fn write_artifacts(
    report: &BatchReport,
    formats: &OutputFormats,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let artifacts = report.artifacts(formats);
    if artifacts.is_empty() {
        return Ok(Vec::new());
    }

    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = output_dir.join(&artifact.file_name);
        tokio::fs::write(&path, artifact.content.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

fn print_summary(report: &BatchReport, written: &[PathBuf], elapsed: Duration) {
    for result in report.results.iter().filter(|r| r.success) {
        let s = &result.stats;
        eprintln!(
            "  {}  {} pages  {} text blocks  {} tables  {} formulas  {}",
            bold(result.file_name.as_deref().unwrap_or("")),
            s.total_pages,
            s.text_blocks,
            s.tables,
            s.formulas,
            dim(&format!("({})", result.method.map(|m| m.as_str()).unwrap_or("?"))),
        );
    }

    for (name, error) in report.failures() {
        eprintln!("  {} {}: {}", red("✗"), name, error);
    }

    for path in written {
        eprintln!("  → {}", path.display());
    }

    eprintln!(
        "{}  {}/{} files  {:.1}s",
        if report.failed == 0 { green("✔") } else { cyan("⚠") },
        report.succeeded,
        report.results.len(),
        elapsed.as_secs_f64(),
    );
}
