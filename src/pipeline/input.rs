//! Input handling: turn local paths, URLs and raw uploads into
//! [`UploadedFile`]s, and validate PDFs before any parser sees them.
//!
//! Every upload is checked for the `%PDF` magic bytes so a mislabelled file
//! fails with a clear [`ProcessError::NotAPdf`] instead of a parser error.

use crate::error::ProcessError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fallback name for uploads whose name has no usable component.
const DEFAULT_FILE_NAME: &str = "document.pdf";

/// One uploaded PDF: its original name and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// File name reduced to its final path component.
    pub fn safe_name(&self) -> String {
        sanitize_file_name(&self.name)
    }

    /// File stem used for titles and download names (`report.pdf` → `report`).
    pub fn stem(&self) -> String {
        let safe = self.safe_name();
        Path::new(&safe)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".to_string())
    }

    /// Read a local file into an upload, validating existence and magic bytes.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ProcessError> {
        let path = path.as_ref();
        validate_pdf(path)?;
        let bytes = tokio::fs::read(path).await.map_err(|e| map_open_error(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
        Ok(Self { name, bytes })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a CLI-style input (path or URL) into an upload.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<UploadedFile, ProcessError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else if input.trim().is_empty() {
        Err(ProcessError::InvalidInput {
            input: input.to_string(),
        })
    } else {
        UploadedFile::from_path(input).await
    }
}

/// Validate that `path` exists, is readable and starts with `%PDF`.
///
/// Returns the file size in bytes.
pub fn validate_pdf(path: &Path) -> Result<u64, ProcessError> {
    if !path.exists() {
        return Err(ProcessError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut f = std::fs::File::open(path).map_err(|e| map_open_error(path, e))?;
    let size = f.metadata().map(|m| m.len()).unwrap_or(0);

    let mut magic = [0u8; 4];
    match f.read_exact(&mut magic) {
        Ok(()) => check_magic(&magic, path)?,
        Err(_) => {
            return Err(ProcessError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("file is only {size} bytes long"),
            })
        }
    }

    debug!("Validated PDF: {} ({} bytes)", path.display(), size);
    Ok(size)
}

/// Fail unless `bytes` starts with the PDF magic.
pub fn check_magic(bytes: &[u8], path: &Path) -> Result<(), ProcessError> {
    if bytes.len() >= 4 && &bytes[..4] == b"%PDF" {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(ProcessError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

fn map_open_error(path: &Path, e: std::io::Error) -> ProcessError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => ProcessError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => ProcessError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => ProcessError::CorruptPdf {
            path: path.to_path_buf(),
            detail: e.to_string(),
        },
    }
}

/// Reduce an upload name to a safe final path component.
///
/// Strips directories (both separators), rejects `.`/`..`, and falls back
/// to `document.pdf`.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches(char::from(0));
    if last.is_empty() || last == "." || last == ".." {
        DEFAULT_FILE_NAME.to_string()
    } else {
        last.to_string()
    }
}

/// Download a URL into memory and return it as an upload.
async fn download_url(url: &str, timeout_secs: u64) -> Result<UploadedFile, ProcessError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProcessError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ProcessError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ProcessError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ProcessError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let name = file_name_from_url(url);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProcessError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    check_magic(&bytes, &PathBuf::from(&name))?;
    info!("Downloaded {} ({} bytes)", name, bytes.len());

    Ok(UploadedFile {
        name,
        bytes: bytes.to_vec(),
    })
}

/// Extract a reasonable filename from the URL path.
fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return sanitize_file_name(last);
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
