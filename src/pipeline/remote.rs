//! Client for a remote processing service.
//!
//! `POST {base_url}/process` with a multipart body: `file` (the PDF) and
//! `config` (the JSON-encoded [`ProcessingConfig`]). A 200 response whose
//! body parses as a [`ProcessingResult`] is the file's result. Anything else
//! means the service is unavailable and the caller falls back to basic
//! extraction.

use crate::config::ProcessingConfig;
use crate::error::ProcessError;
use crate::output::ProcessingResult;
use crate::progress::ProgressReporter;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// HTTP client for the remote `/process` endpoint.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ProcessError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProcessError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/process", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `pdf` to the service.
    ///
    /// Returns `None` when the service is unavailable, after logging why.
    pub async fn process(
        &self,
        pdf: &Path,
        file_name: &str,
        config: &ProcessingConfig,
        progress: &ProgressReporter,
    ) -> Option<ProcessingResult> {
        progress.report(0.2, "Sending to the processing API...");
        match self.try_process(pdf, file_name, config).await {
            Ok(result) => {
                info!("Remote API processed {}", file_name);
                progress.report(0.8, "Received result from the processing API");
                Some(result)
            }
            Err(reason) => {
                warn!("Remote API unavailable ({}), falling back to basic extraction", reason);
                None
            }
        }
    }

    async fn try_process(
        &self,
        pdf: &Path,
        file_name: &str,
        config: &ProcessingConfig,
    ) -> Result<ProcessingResult, String> {
        let bytes = tokio::fs::read(pdf)
            .await
            .map_err(|e| format!("reading {}: {e}", pdf.display()))?;
        let config_json = serde_json::to_string(config).map_err(|e| e.to_string())?;

        let file_part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| e.to_string())?;
        let form = Form::new()
            .part("file", file_part)
            .text("config", config_json);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(format!("HTTP {status}"));
        }

        let body = response.text().await.map_err(|e| e.to_string())?;
        serde_json::from_str::<ProcessingResult>(&body)
            .map_err(|e| format!("unparsable response: {e}"))
    }
}
