//! Integration tests for the upload → processing → results flow.
//!
//! Storage is an in-memory `MemoryStore`, the quota service is a scripted
//! fake, and PDFs are built with lopdf. Timing-sensitive tests run on
//! tokio's paused clock, so 30 virtual minutes of polling finish instantly.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use lopdf::{dictionary, Document, Object, Stream};
use pdf_remediate::quota::QuotaMode;
use pdf_remediate::{
    ClientConfig, IdToken, MemoryStore, ObjectStore, OutputFormat, ProcessedResult,
    ProcessingOutcome, ProcessingProgressCallback, ProcessingSession, QuotaApi, RemediateError,
    ReportFetcher, SelectedFile, UploadController, UsageSnapshot,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

const PDF_BUCKET: &str = "pdf-bucket";
const HTML_BUCKET: &str = "html-bucket";

fn config() -> ClientConfig {
    ClientConfig::builder()
        .pdf_bucket(PDF_BUCKET)
        .html_bucket(HTML_BUCKET)
        .build()
        .unwrap()
}

fn token() -> IdToken {
    let payload = serde_json::json!({
        "sub": "3f1c9a7e-user",
        "email": "Jane.Doe@example.com",
        "exp": 4_102_444_800i64,
    });
    let raw = format!(
        "eyJhbGciOiJSUzI1NiJ9.{}.sig",
        URL_SAFE_NO_PAD.encode(payload.to_string())
    );
    IdToken::parse(raw).unwrap()
}

/// A PDF with `pages` blank pages, padded with an uncompressed stream of
/// `padding` bytes.
fn pdf(pages: usize, padding: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    if padding > 0 {
        doc.add_object(Stream::new(dictionary! {}, vec![b' '; padding]));
    }
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn usage(current: u32) -> UsageSnapshot {
    UsageSnapshot {
        current_usage: current,
        max_files_allowed: 8,
        max_pages_allowed: 10,
        max_size_allowed_mb: 25,
        ..UsageSnapshot::default()
    }
}

/// Quota service fake: counts calls, optionally refuses increments with 403.
#[derive(Default)]
struct FakeQuota {
    checks: AtomicU32,
    increments: AtomicU32,
    exhausted: bool,
}

impl FakeQuota {
    fn exhausted() -> Self {
        Self {
            exhausted: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> u32 {
        self.checks.load(Ordering::SeqCst) + self.increments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuotaApi for FakeQuota {
    async fn request(
        &self,
        _token: &IdToken,
        mode: QuotaMode,
        _format: OutputFormat,
    ) -> Result<UsageSnapshot, RemediateError> {
        match mode {
            QuotaMode::Check => {
                self.checks.fetch_add(1, Ordering::SeqCst);
                Ok(usage(self.increments.load(Ordering::SeqCst)))
            }
            QuotaMode::Increment if self.exhausted => {
                Err(RemediateError::QuotaExceeded { limit: 8 })
            }
            QuotaMode::Increment => {
                let n = self.increments.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(UsageSnapshot {
                    new_count: Some(n),
                    ..usage(n)
                })
            }
        }
    }
}

#[derive(Default)]
struct Recorder {
    ready: AtomicU32,
    timed_out: AtomicU32,
    attempts: AtomicU32,
}

impl ProcessingProgressCallback for Recorder {
    fn on_attempt(&self, attempt: u32, _max_attempts: u32) {
        self.attempts.store(attempt, Ordering::SeqCst);
    }
    fn on_ready(&self, _result: &ProcessedResult) {
        self.ready.fetch_add(1, Ordering::SeqCst);
    }
    fn on_timed_out(&self, _attempts: u32) {
        self.timed_out.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Upload ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn five_page_pdf_is_uploaded_once_under_pdf_prefix() {
    let store = Arc::new(MemoryStore::new());
    let quota = Arc::new(FakeQuota::default());
    let controller = UploadController::new(config(), store.clone(), quota.clone());

    let file = SelectedFile::from_bytes("Annual Report.pdf", pdf(5, 2 * 1024 * 1024));
    let receipt = controller
        .upload(&token(), file, OutputFormat::Pdf, &usage(0))
        .await
        .unwrap();

    assert_eq!(store.put_count(), 1);
    assert_eq!(quota.increments.load(Ordering::SeqCst), 1);
    assert_eq!(receipt.task.page_count, 5);
    assert_eq!(receipt.bucket, PDF_BUCKET);
    assert!(receipt.object_key.starts_with("pdf/Jane_Doe_example_com_"));
    assert!(receipt.object_key.ends_with(&format!("_{}", receipt.sanitized_name())));
    assert_eq!(store.keys(PDF_BUCKET), vec![receipt.object_key.clone()]);
    assert_eq!(
        store.content_type(PDF_BUCKET, &receipt.object_key).as_deref(),
        Some("application/pdf")
    );
    assert_eq!(receipt.usage.map(|u| u.current_usage), Some(1));
}

#[tokio::test]
async fn eleven_pages_are_rejected_before_any_network_call() {
    let store = Arc::new(MemoryStore::new());
    let quota = Arc::new(FakeQuota::default());
    let controller = UploadController::new(config(), store.clone(), quota.clone());

    let file = SelectedFile::from_bytes("long.pdf", pdf(11, 0));
    let err = controller
        .upload(&token(), file, OutputFormat::Pdf, &usage(0))
        .await
        .unwrap_err();

    assert!(err.is_validation(), "unexpected error: {err}");
    assert!(err.to_string().contains("10"));
    assert_eq!(quota.calls(), 0);
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn oversize_file_is_rejected_before_any_network_call() {
    let store = Arc::new(MemoryStore::new());
    let quota = Arc::new(FakeQuota::default());
    let controller = UploadController::new(config(), store.clone(), quota.clone());
    let tight = UsageSnapshot {
        max_size_allowed_mb: 1,
        ..usage(0)
    };

    let file = SelectedFile::from_bytes("big.pdf", pdf(1, 2 * 1024 * 1024));
    let err = controller
        .upload(&token(), file, OutputFormat::Pdf, &tight)
        .await
        .unwrap_err();

    assert!(matches!(err, RemediateError::FileTooLarge { limit_mb: 1, .. }));
    assert_eq!(quota.calls(), 0);
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn non_pdf_is_rejected_before_any_network_call() {
    let store = Arc::new(MemoryStore::new());
    let quota = Arc::new(FakeQuota::default());
    let controller = UploadController::new(config(), store.clone(), quota.clone());

    for file in [
        SelectedFile::from_bytes("notes.docx", pdf(1, 0)),
        SelectedFile::from_bytes("renamed.pdf", b"PK\x03\x04not a pdf".to_vec()),
    ] {
        let err = controller
            .upload(&token(), file, OutputFormat::Pdf, &usage(0))
            .await
            .unwrap_err();
        assert!(matches!(err, RemediateError::NotAPdf { .. }), "got: {err}");
    }

    assert_eq!(quota.calls(), 0);
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn refused_increment_stores_nothing() {
    let store = Arc::new(MemoryStore::new());
    let quota = Arc::new(FakeQuota::exhausted());
    let controller = UploadController::new(config(), store.clone(), quota.clone());

    let file = SelectedFile::from_bytes("doc.pdf", pdf(1, 0));
    let err = controller
        .upload(&token(), file, OutputFormat::Pdf, &usage(3))
        .await
        .unwrap_err();

    assert!(matches!(err, RemediateError::QuotaExceeded { limit: 8 }));
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn html_upload_lands_in_html_bucket() {
    let store = Arc::new(MemoryStore::new());
    let controller =
        UploadController::new(config(), store.clone(), Arc::new(FakeQuota::default()));

    let receipt = controller
        .upload(
            &token(),
            SelectedFile::from_bytes("slides.pdf", pdf(2, 0)),
            OutputFormat::Html,
            &usage(0),
        )
        .await
        .unwrap();

    assert_eq!(receipt.bucket, HTML_BUCKET);
    assert!(receipt.object_key.starts_with("uploads/"));
    assert!(store.keys(PDF_BUCKET).is_empty());
}

// ── Processing ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn polling_gives_up_after_max_attempts() {
    let store = Arc::new(MemoryStore::new());
    let controller =
        UploadController::new(config(), store.clone(), Arc::new(FakeQuota::default()));
    let receipt = controller
        .upload(
            &token(),
            SelectedFile::from_bytes("doc.pdf", pdf(1, 0)),
            OutputFormat::Pdf,
            &usage(0),
        )
        .await
        .unwrap();

    let recorder = Arc::new(Recorder::default());
    let outcome = ProcessingSession::new(&config(), store.clone(), &receipt)
        .unwrap()
        .with_callback(recorder.clone())
        .spawn()
        .wait()
        .await;

    assert!(matches!(outcome, ProcessingOutcome::TimedOut { attempts: 120 }));
    assert_eq!(store.head_count(), 120);
    assert_eq!(store.presign_count(), 0);
    assert_eq!(recorder.attempts.load(Ordering::SeqCst), 120);
    assert_eq!(recorder.timed_out.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.ready.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn output_appearing_mid_poll_is_picked_up() {
    let store = Arc::new(MemoryStore::new());
    let controller =
        UploadController::new(config(), store.clone(), Arc::new(FakeQuota::default()));
    let receipt = controller
        .upload(
            &token(),
            SelectedFile::from_bytes("doc.pdf", pdf(1, 0)),
            OutputFormat::Pdf,
            &usage(0),
        )
        .await
        .unwrap();

    let recorder = Arc::new(Recorder::default());
    let session = ProcessingSession::new(&config(), store.clone(), &receipt)
        .unwrap()
        .with_callback(recorder.clone());
    let result_key = session.result_key().to_string();
    let handle = session.spawn();

    // Checks run at 15 s, 30 s and 45 s; the output lands before the 60 s check.
    tokio::time::sleep(Duration::from_secs(50)).await;
    store.insert(PDF_BUCKET, &result_key, "%PDF-1.7 remediated");

    let result = handle.wait().await.into_result().unwrap();
    assert_eq!(result.processing_time_secs, Some(60));
    assert_eq!(
        result.download_filename.as_deref(),
        Some(format!("COMPLIANT_{}", receipt.sanitized_name()).as_str())
    );
    assert_eq!(store.head_count(), 4);
    assert_eq!(recorder.ready.load(Ordering::SeqCst), 1);
}

// ── Reports ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn missing_before_report_does_not_block_the_after_report() {
    let store = Arc::new(MemoryStore::new());
    let object_name = "jane_doe_example_com_20240309070501042_doc.pdf";
    store.insert(
        PDF_BUCKET,
        &pdf_remediate::ReportKind::After.key(object_name),
        serde_json::json!({
            "Summary": {"Description": "ok", "Needs manual check": 1, "Passed": 30, "Failed": 0},
            "Detailed Report": {
                "Document": [{"Rule": "Title", "Description": "Document title", "Status": "Passed"}]
            }
        })
        .to_string(),
    );

    let fetcher = ReportFetcher::new(&config(), store.clone()).unwrap();
    let pair = fetcher.fetch_both(object_name, "doc.pdf").await;

    assert!(pair.before.is_err());
    let after = pair.after.as_ref().unwrap();
    assert_eq!(after.attempts, 1);
    assert_eq!(
        after.download_filename,
        "COMPLIANT_doc_after_remediation_accessibility_report.json"
    );

    // Three attempts for the missing report plus one for the present one.
    assert_eq!(store.head_count(), 4);

    let comparison = pair.comparison();
    assert!(!comparison.is_empty());
    let row = &comparison.categories[0].rows[0];
    assert_eq!(row.before_label(), "—");
    assert_eq!(row.after_label(), "Passed");
}

#[tokio::test]
async fn reports_require_the_pdf_bucket() {
    let config = ClientConfig::builder().html_bucket(HTML_BUCKET).build().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    assert!(ReportFetcher::new(&config, store).is_err());
}
