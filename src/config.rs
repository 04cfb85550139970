//! Configuration types for PDF processing.
//!
//! Two layers of configuration exist:
//!
//! * [`ProcessingConfig`]: what the caller asks for on one run (language,
//!   parse method, feature toggles). Serialised as-is into the `config`
//!   field of the remote API request.
//! * [`ProcessorSettings`]: how this deployment is wired (strategy mode,
//!   remote API URL, engine executable, upload ceiling). Usually read from
//!   the environment with [`ProcessorSettings::from_env`].

use crate::error::ProcessError;
use crate::pipeline::extract::ExtractorBackend;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default timeout for the remote `/process` call.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 300;

/// Default name of the MinerU executable looked up on `PATH`.
pub const DEFAULT_ENGINE_BIN: &str = "mineru";

/// Per-run processing options.
///
/// # Example
/// ```rust
/// use mineru_pdf2md::{Language, ParseMethod, ProcessingConfig};
///
/// let config = ProcessingConfig::builder()
///     .language(Language::En)
///     .parse_method(ParseMethod::Ocr)
///     .formula_enable(false)
///     .build();
/// assert!(config.table_enable);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Main document language. Default: [`Language::Ch`].
    pub language: Language,

    /// How the layout engine should read the page. Default: [`ParseMethod::Auto`].
    pub parse_method: ParseMethod,

    /// Ask the engine to recognise formulas. Default: true.
    pub formula_enable: bool,

    /// Ask the engine to recognise tables. Default: true.
    pub table_enable: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            parse_method: ParseMethod::default(),
            formula_enable: true,
            table_enable: true,
        }
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn language(mut self, language: Language) -> Self {
        self.config.language = language;
        self
    }

    pub fn parse_method(mut self, method: ParseMethod) -> Self {
        self.config.parse_method = method;
        self
    }

    pub fn formula_enable(mut self, v: bool) -> Self {
        self.config.formula_enable = v;
        self
    }

    pub fn table_enable(mut self, v: bool) -> Self {
        self.config.table_enable = v;
        self
    }

    /// Build the configuration.
    ///
    /// Text-layer parsing cannot see formulas drawn as images, so
    /// `parse_method = txt` with formulas enabled is allowed but logged.
    pub fn build(self) -> ProcessingConfig {
        let c = &self.config;
        if c.parse_method == ParseMethod::Txt && c.formula_enable {
            tracing::debug!("formula recognition requested with txt parsing; engine may ignore it");
        }
        self.config
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Document language hint passed to the layout engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Chinese (default). Also what the engine receives for `Auto`.
    #[default]
    Ch,
    /// English.
    En,
    /// Let the caller's engine decide.
    Auto,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Ch => "ch",
            Language::En => "en",
            Language::Auto => "auto",
        }
    }

    /// The language code handed to the engine. MinerU has no auto mode, so
    /// `Auto` maps to `ch`.
    pub fn engine_code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ch | Language::Auto => "ch",
        }
    }
}

impl FromStr for Language {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ch" | "zh" => Ok(Language::Ch),
            "en" => Ok(Language::En),
            "auto" => Ok(Language::Auto),
            other => Err(ProcessError::InvalidConfig(format!(
                "unknown language '{other}' (expected ch, en or auto)"
            ))),
        }
    }
}

/// Parse strategy passed to the layout engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMethod {
    /// Engine picks text-layer or OCR per document (default).
    #[default]
    Auto,
    /// Force OCR.
    Ocr,
    /// Use the embedded text layer only.
    Txt,
}

impl ParseMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMethod::Auto => "auto",
            ParseMethod::Ocr => "ocr",
            ParseMethod::Txt => "txt",
        }
    }
}

impl FromStr for ParseMethod {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ParseMethod::Auto),
            "ocr" => Ok(ParseMethod::Ocr),
            "txt" | "text" => Ok(ParseMethod::Txt),
            other => Err(ProcessError::InvalidConfig(format!(
                "unknown parse method '{other}' (expected auto, ocr or txt)"
            ))),
        }
    }
}

/// Which processing strategy the [`crate::process::Processor`] should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Engine if present, else remote API if configured, else basic (default).
    #[default]
    Auto,
    /// Always use basic text extraction.
    Basic,
    /// Use the layout engine; emit the demo document when it is missing.
    Engine,
    /// Use the remote API, falling back to basic when it is unavailable.
    Api,
}

impl FromStr for ProcessingMode {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ProcessingMode::Auto),
            "basic" => Ok(ProcessingMode::Basic),
            "engine" | "mineru" => Ok(ProcessingMode::Engine),
            "api" | "remote" => Ok(ProcessingMode::Api),
            other => Err(ProcessError::InvalidConfig(format!(
                "unknown processing mode '{other}' (expected auto, basic, engine or api)"
            ))),
        }
    }
}

/// Where the service runs. Selects the total upload ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    /// Workstation or self-hosted server (default): 200 MB.
    #[default]
    Local,
    /// Constrained serverless host: 50 MB.
    Serverless,
}

impl Deployment {
    /// Maximum combined size of one batch, in megabytes.
    pub fn upload_limit_mb(&self) -> u64 {
        match self {
            Deployment::Local => 200,
            Deployment::Serverless => 50,
        }
    }

    /// Maximum combined size of one batch, in bytes.
    pub fn upload_limit_bytes(&self) -> u64 {
        self.upload_limit_mb() * 1024 * 1024
    }
}

// ── Output formats ───────────────────────────────────────────────────────

/// A downloadable rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Markdown,
    Html,
    Text,
    Json,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Markdown,
        OutputFormat::Html,
        OutputFormat::Text,
        OutputFormat::Json,
    ];

    /// File extension used for downloads.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Html => "html",
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
        }
    }

    /// MIME type offered with the download: `text/{extension}`.
    pub fn mime_type(&self) -> String {
        format!("text/{}", self.extension())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Html => "html",
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            "html" | "htm" => Ok(OutputFormat::Html),
            "txt" | "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(ProcessError::InvalidConfig(format!(
                "unknown output format '{other}' (expected md, html, txt or json)"
            ))),
        }
    }
}

/// The set of renditions the caller wants to download.
///
/// Default: Markdown, HTML and text. JSON is opt-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormats(BTreeSet<OutputFormat>);

impl Default for OutputFormats {
    fn default() -> Self {
        Self(
            [OutputFormat::Markdown, OutputFormat::Html, OutputFormat::Text]
                .into_iter()
                .collect(),
        )
    }
}

impl OutputFormats {
    pub fn all() -> Self {
        Self(OutputFormat::ALL.into_iter().collect())
    }

    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    pub fn with(mut self, format: OutputFormat) -> Self {
        self.0.insert(format);
        self
    }

    pub fn without(mut self, format: OutputFormat) -> Self {
        self.0.remove(&format);
        self
    }

    pub fn contains(&self, format: OutputFormat) -> bool {
        self.0.contains(&format)
    }

    /// Enabled formats in display order: markdown, html, text, json.
    pub fn iter(&self) -> impl Iterator<Item = OutputFormat> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for OutputFormats {
    type Err = ProcessError;

    /// Parse a comma-separated list such as `md,html,json` or `all`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        let set = s
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(OutputFormat::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        if set.is_empty() {
            return Err(ProcessError::InvalidConfig(
                "at least one output format is required".into(),
            ));
        }
        Ok(Self(set))
    }
}

// ── Deployment settings ──────────────────────────────────────────────────

/// How this deployment is wired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorSettings {
    /// Strategy selection. Default: [`ProcessingMode::Auto`].
    pub mode: ProcessingMode,

    /// Base URL of a remote processing service. Enables the remote branch.
    pub api_base_url: Option<String>,

    /// Timeout for the remote `/process` call in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// Layout engine executable. Default: `mineru`.
    pub engine_bin: PathBuf,

    /// Text extraction backend for the basic branch. Default: Auto.
    pub extractor: ExtractorBackend,

    /// Deployment target. Default: Local.
    pub deployment: Deployment,

    /// Parent directory for batch workspaces. Default: system temp dir.
    pub workspace_root: Option<PathBuf>,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::default(),
            api_base_url: None,
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            engine_bin: PathBuf::from(DEFAULT_ENGINE_BIN),
            extractor: ExtractorBackend::default(),
            deployment: Deployment::default(),
            workspace_root: None,
        }
    }
}

impl ProcessorSettings {
    /// Read settings from the process environment.
    ///
    /// | Variable         | Effect                                   |
    /// |------------------|------------------------------------------|
    /// | `VERCEL=1`       | serverless upload ceiling (50 MB)        |
    /// | `MINERU_API_URL` | enables the remote API branch            |
    /// | `MINERU_BIN`     | layout engine executable                 |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        if lookup("VERCEL").as_deref() == Some("1") {
            settings.deployment = Deployment::Serverless;
        }
        if let Some(url) = lookup("MINERU_API_URL").filter(|u| !u.trim().is_empty()) {
            settings.api_base_url = Some(url.trim().to_string());
        }
        if let Some(bin) = lookup("MINERU_BIN").filter(|b| !b.trim().is_empty()) {
            settings.engine_bin = PathBuf::from(bin.trim());
        }
        settings
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ProcessError> {
        if self.mode == ProcessingMode::Api && self.api_base_url.is_none() {
            return Err(ProcessError::InvalidConfig(
                "api mode requires an API base URL (set MINERU_API_URL or --api-url)".into(),
            ));
        }
        if let Some(ref url) = self.api_base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ProcessError::InvalidConfig(format!(
                    "API base URL must be http(s), got '{url}'"
                )));
            }
        }
        if self.api_timeout_secs == 0 {
            return Err(ProcessError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(())
    }
}
