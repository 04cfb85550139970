//! Integration tests for the batch controller and processing strategies.
//!
//! PDFs are generated on the fly with lopdf, and the basic strategy is
//! pinned to the lopdf backend so no pdfium library is needed. The remote
//! API is played by a throwaway TCP listener.

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use mineru_pdf2md::{
    process_batch, ChannelObserver, Deployment, EngineArtifacts, ExtractorBackend, Language, LayoutEngine, Method,
    NoopProgress, OutputFormat, OutputFormats, ProcessError, ProcessingConfig, ProcessingMode,
    ProcessingResult, Processor, ProcessorSettings, ProgressEvent, UploadedFile,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Build a PDF with one page per entry; an empty entry makes a blank page.
fn make_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(24)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(700)]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn settings(mode: ProcessingMode, root: &Path) -> ProcessorSettings {
    ProcessorSettings {
        mode,
        extractor: ExtractorBackend::Lopdf,
        workspace_root: Some(root.to_path_buf()),
        ..Default::default()
    }
}

async fn run(
    settings: &ProcessorSettings,
    engine: Option<Arc<dyn LayoutEngine>>,
    files: &[UploadedFile],
) -> Result<mineru_pdf2md::BatchReport, ProcessError> {
    init_tracing();
    let processor = Processor::new(settings, engine).unwrap();
    process_batch(
        &processor,
        settings,
        files,
        &ProcessingConfig::default(),
        Arc::new(NoopProgress),
    )
    .await
}

/// JSON rendition with the run-dependent fields removed.
fn stable_json(result: &ProcessingResult) -> serde_json::Value {
    let mut v: serde_json::Value = serde_json::from_str(&result.outputs.json_content).unwrap();
    v["document"].as_object_mut().unwrap().remove("processed_at");
    v["metadata"].as_object_mut().unwrap().remove("processing_time");
    v
}

/// Answers every connection with HTTP 500.
async fn spawn_failing_api() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = vec![0u8; 64 * 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(
                    b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                )
                .await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}")
}

/// Read one HTTP request: headers plus a `content-length` body, or up to
/// the closing multipart boundary or last chunk when no length is sent.
async fn read_request(socket: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());
            match length {
                Some(len) if buf.len() >= end + 4 + len => break,
                None if buf.ends_with(b"--\r\n") || buf.ends_with(b"\r\n0\r\n\r\n") => break,
                _ => {}
            }
        }
    }
    buf
}

/// Answers one request with HTTP 200 and `body`, handing the raw request
/// back through the returned receiver.
async fn spawn_api(body: &'static str) -> (String, tokio::sync::oneshot::Receiver<String>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
        }
    });
    (format!("http://{addr}"), rx)
}

struct MarkdownEngine;

#[async_trait]
impl LayoutEngine for MarkdownEngine {
    fn name(&self) -> &str {
        "markdown-engine"
    }

    async fn parse(
        &self,
        pdf: &Path,
        output_dir: &Path,
        _config: &ProcessingConfig,
    ) -> Result<EngineArtifacts, ProcessError> {
        let stem = pdf.file_stem().unwrap().to_string_lossy().into_owned();
        let auto = output_dir.join(&stem).join("auto");
        std::fs::create_dir_all(&auto).unwrap();
        let md = auto.join(format!("{stem}.md"));
        std::fs::write(&md, "# Parsed\n\n**Layout** text with $E=mc^2$.\n").unwrap();
        let json = auto.join(format!("{stem}_content_list.json"));
        std::fs::write(&json, r#"[{"type":"text","text":"Parsed"}]"#).unwrap();
        Ok(EngineArtifacts {
            markdown: Some(md),
            json: Some(json),
        })
    }
}

// ── Basic strategy ───────────────────────────────────────────────────────────

#[tokio::test]
async fn basic_page_count_matches_pdf() {
    let root = tempfile::tempdir().unwrap();
    let pdf = make_pdf(&["Alpha page", "", "Gamma page"]);
    let report = run(
        &settings(ProcessingMode::Basic, root.path()),
        None,
        &[UploadedFile::new("three.pdf", pdf)],
    )
    .await
    .unwrap();

    assert_eq!(report.succeeded, 1);
    let r = &report.results[0];
    assert!(r.success, "{:?}", r.error);
    assert_eq!(r.method, Some(Method::Basic));
    assert_eq!(r.stats.total_pages, 3);
    assert_eq!(r.stats.text_blocks, 2);
    assert_eq!(r.stats.tables, 0);
    assert_eq!(r.stats.formulas, 0);

    let md = &r.outputs.markdown_content;
    assert!(md.contains("# Page 1"));
    assert!(md.contains("Alpha"));
    assert!(!md.contains("# Page 2"));
    assert!(md.contains("# Page 3"));
    assert!(r.outputs.text_content.contains("Gamma"));

    assert!(r.outputs.html_content.contains("<html>"));
    assert!(r.outputs.html_content.contains("</html>"));

    let json: serde_json::Value = serde_json::from_str(&r.outputs.json_content).unwrap();
    assert_eq!(json["document"]["title"], "three");
    assert_eq!(json["document"]["pages"], 3);
    assert_eq!(json["document"]["processor"], "lopdf");
}

#[tokio::test]
async fn corrupt_file_fails_alone() {
    let root = tempfile::tempdir().unwrap();
    let files = vec![
        UploadedFile::new("one.pdf", make_pdf(&["first"])),
        UploadedFile::new("broken.pdf", b"\x89PNG\r\n\x1a\nnot a pdf".to_vec()),
        UploadedFile::new("three.pdf", make_pdf(&["third", "more"])),
    ];
    let report = run(&settings(ProcessingMode::Basic, root.path()), None, &files)
        .await
        .unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);

    let names: Vec<_> = report
        .results
        .iter()
        .map(|r| r.file_name.as_deref().unwrap())
        .collect();
    assert_eq!(names, vec!["one.pdf", "broken.pdf", "three.pdf"]);

    assert!(report.results[0].success);
    assert!(!report.results[1].success);
    assert!(report.results[1].traceback.is_some());
    assert!(report.results[2].success);
    assert_eq!(report.results[2].stats.total_pages, 2);

    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "broken.pdf");
}

#[tokio::test]
async fn non_pdf_upload_is_rejected_per_file() {
    let root = tempfile::tempdir().unwrap();
    let files = vec![
        UploadedFile::new("notes.pdf", b"plain text, not a pdf".to_vec()),
        UploadedFile::new("ok.pdf", make_pdf(&["fine"])),
    ];
    let report = run(&settings(ProcessingMode::Basic, root.path()), None, &files)
        .await
        .unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(report.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("not a valid PDF"));
}

#[tokio::test]
async fn duplicate_names_are_kept_apart() {
    let root = tempfile::tempdir().unwrap();
    let files = vec![
        UploadedFile::new("same.pdf", make_pdf(&["version one"])),
        UploadedFile::new("same.pdf", make_pdf(&["version two"])),
    ];
    let report = run(&settings(ProcessingMode::Basic, root.path()), None, &files)
        .await
        .unwrap();
    assert_eq!(report.succeeded, 2);
    assert!(report.results[0].outputs.markdown_content.contains("one"));
    assert!(report.results[1].outputs.markdown_content.contains("two"));

    let arts = report.artifacts(&OutputFormats::default().without(OutputFormat::Html));
    let names: Vec<_> = arts.iter().map(|a| a.file_name.as_str()).collect();
    assert_eq!(names, vec!["same.md", "same.txt", "same_2.md", "same_2.txt"]);
    assert!(arts[2].content.contains("two"));
}

// ── Workspace lifecycle ──────────────────────────────────────────────────────

#[tokio::test]
async fn workspace_is_removed_after_success() {
    let root = tempfile::tempdir().unwrap();
    let report = run(
        &settings(ProcessingMode::Basic, root.path()),
        None,
        &[UploadedFile::new("a.pdf", make_pdf(&["a"]))],
    )
    .await
    .unwrap();

    assert!(report
        .workspace
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("mineru_"));
    assert!(!report.workspace.exists());
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn workspace_is_removed_after_failures() {
    let root = tempfile::tempdir().unwrap();
    let report = run(
        &settings(ProcessingMode::Basic, root.path()),
        None,
        &[UploadedFile::new("bad.pdf", b"garbage".to_vec())],
    )
    .await
    .unwrap();
    assert_eq!(report.failed, 1);
    assert!(!report.workspace.exists());
}

#[tokio::test]
async fn oversized_batch_is_rejected_before_workspace() {
    let root = tempfile::tempdir().unwrap();
    let mut s = settings(ProcessingMode::Basic, root.path());
    s.deployment = Deployment::Serverless;
    let big = vec![b'%'; 51 * 1024 * 1024];
    let err = run(&s, None, &[UploadedFile::new("huge.pdf", big)])
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::UploadTooLarge { limit_mb: 50, .. }));
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

// ── Remote strategy ──────────────────────────────────────────────────────────

#[tokio::test]
async fn remote_500_matches_basic() {
    let root = tempfile::tempdir().unwrap();
    let url = spawn_failing_api().await;
    let pdf = make_pdf(&["Remote fallback text", "Second page"]);
    let files = [UploadedFile::new("doc.pdf", pdf)];

    let mut api = settings(ProcessingMode::Api, root.path());
    api.api_base_url = Some(url);
    api.api_timeout_secs = 10;
    let remote = run(&api, None, &files).await.unwrap();

    let basic = run(&settings(ProcessingMode::Basic, root.path()), None, &files)
        .await
        .unwrap();

    let (r, b) = (&remote.results[0], &basic.results[0]);
    assert!(r.success);
    assert_eq!(r.method, Some(Method::Basic));
    assert_eq!(r.stats, b.stats);
    assert_eq!(r.outputs.markdown_content, b.outputs.markdown_content);
    assert_eq!(r.outputs.html_content, b.outputs.html_content);
    assert_eq!(r.outputs.text_content, b.outputs.text_content);
    assert_eq!(stable_json(r), stable_json(b));
    assert_eq!(r.file_name, b.file_name);
}

#[tokio::test]
async fn remote_request_and_minimal_result() {
    init_tracing();
    let root = tempfile::tempdir().unwrap();
    let (url, request) = spawn_api(r##"{"success":true,"outputs":{"markdown_content":"# R"}}"##).await;

    let mut api = settings(ProcessingMode::Api, root.path());
    api.api_base_url = Some(url);
    api.api_timeout_secs = 10;
    let config = ProcessingConfig::builder()
        .language(Language::En)
        .table_enable(false)
        .build();
    let processor = Processor::new(&api, None).unwrap();
    let report = process_batch(
        &processor,
        &api,
        &[UploadedFile::new("doc.pdf", make_pdf(&["one", "two"]))],
        &config,
        Arc::new(NoopProgress),
    )
    .await
    .unwrap();

    let request = request.await.unwrap();
    assert!(request.starts_with("POST /process HTTP/1.1"), "{request}");
    let lower = request.to_ascii_lowercase();
    assert!(lower.contains("content-type: multipart/form-data; boundary="));
    assert!(request.contains(r#"name="file"; filename="doc.pdf""#));
    assert!(lower.contains("content-type: application/pdf"));
    assert!(request.contains("%PDF-1.5"));
    assert!(request.contains(r#"name="config""#));
    assert!(request.contains(&serde_json::to_string(&config).unwrap()));
    assert!(request.contains(r#""language":"en""#));
    assert!(request.contains(r#""table_enable":false"#));

    let r = &report.results[0];
    assert!(r.success, "{:?}", r.error);
    assert_eq!(r.method, Some(Method::Mineru));
    assert_eq!(r.stats.total_pages, 2);
    assert_eq!(r.outputs.markdown_content, "# R");
    assert!(r.outputs.html_content.contains("<html>"));
    assert!(r.outputs.html_content.contains("</html>"));
    assert_eq!(r.outputs.text_content, "R");
    let json: serde_json::Value = serde_json::from_str(&r.outputs.json_content).unwrap();
    assert_eq!(json["document"]["method"], "mineru");
    assert_eq!(json["document"]["pages"], 2);
    assert_eq!(json["content"]["markdown"], "# R");
}

#[tokio::test]
async fn remote_success_without_markdown_falls_back_to_basic() {
    let root = tempfile::tempdir().unwrap();
    let (url, _request) = spawn_api(r##"{"success":true,"outputs":{"markdown_content":"  "}}"##).await;

    let mut api = settings(ProcessingMode::Api, root.path());
    api.api_base_url = Some(url);
    api.api_timeout_secs = 10;
    let report = run(&api, None, &[UploadedFile::new("doc.pdf", make_pdf(&["Local text"]))])
        .await
        .unwrap();

    let r = &report.results[0];
    assert!(r.success);
    assert_eq!(r.method, Some(Method::Basic));
    assert!(r.outputs.markdown_content.contains("Local text"));
}

// ── Engine and demo strategies ───────────────────────────────────────────────

#[tokio::test]
async fn engine_results_and_artifacts() {
    let root = tempfile::tempdir().unwrap();
    let report = run(
        &settings(ProcessingMode::Engine, root.path()),
        Some(Arc::new(MarkdownEngine)),
        &[UploadedFile::new("paper.pdf", make_pdf(&["p1", "p2"]))],
    )
    .await
    .unwrap();

    let r = &report.results[0];
    assert!(r.success, "{:?}", r.error);
    assert_eq!(r.method, Some(Method::Mineru));
    assert_eq!(r.stats.total_pages, 2);
    assert_eq!(r.stats.formulas, 1);
    assert!(r.outputs.text_content.contains("Layout text"));
    assert!(r.outputs.json_content.contains("\"type\": \"text\""));

    let arts = report.artifacts(&OutputFormats::all());
    let names: Vec<_> = arts.iter().map(|a| a.file_name.as_str()).collect();
    assert_eq!(names, vec!["paper.md", "paper.html", "paper.txt", "paper.json"]);
    assert_eq!(arts[1].mime_type, "text/html");
}

#[tokio::test]
async fn missing_engine_produces_demo() {
    let root = tempfile::tempdir().unwrap();
    let report = run(
        &settings(ProcessingMode::Engine, root.path()),
        None,
        &[UploadedFile::new("slides.pdf", make_pdf(&["ignored"]))],
    )
    .await
    .unwrap();

    let r = &report.results[0];
    assert_eq!(r.method, Some(Method::Demo));
    assert_eq!(
        (r.stats.total_pages, r.stats.text_blocks, r.stats.tables, r.stats.formulas),
        (1, 4, 1, 3)
    );
    assert!(r.outputs.markdown_content.starts_with("# slides"));
    assert!(!r.outputs.markdown_content.contains("ignored"));

    let formats = OutputFormats::default().without(OutputFormat::Html);
    let names: Vec<_> = report
        .artifacts(&formats)
        .into_iter()
        .map(|a| a.file_name)
        .collect();
    assert_eq!(names, vec!["slides.md", "slides.txt"]);
}

// ── Progress events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_event_sequence() {
    let root = tempfile::tempdir().unwrap();
    let s = settings(ProcessingMode::Basic, root.path());
    let processor = Processor::new(&s, None).unwrap();
    let (observer, mut rx) = ChannelObserver::new();

    process_batch(
        &processor,
        &s,
        &[UploadedFile::new("p.pdf", make_pdf(&["one", "two", "three"]))],
        &ProcessingConfig::default(),
        Arc::new(observer),
    )
    .await
    .unwrap();

    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e);
    }

    assert_eq!(events.first(), Some(&ProgressEvent::BatchStarted { total_files: 1 }));
    assert_eq!(
        events[1],
        ProgressEvent::FileStarted {
            index: 1,
            total: 1,
            file_name: "p.pdf".into()
        }
    );
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::BatchCompleted {
            succeeded: 1,
            failed: 0
        })
    );

    let fractions: Vec<f32> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Progress { fraction, .. } => Some(*fraction),
            _ => None,
        })
        .collect();
    assert!(fractions.len() >= 5, "got {fractions:?}");
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]), "not monotonic: {fractions:?}");
    assert_eq!(fractions.first(), Some(&0.1));
    assert_eq!(fractions.last(), Some(&1.0));
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::Progress { message, .. } if message.contains("page 3/3")
    )));
}
