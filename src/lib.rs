//! # pdf-remediate
//!
//! Client for a PDF accessibility remediation service: upload a PDF, wait
//! for the remediation pipeline to publish an accessible version, download
//! it, and compare the accessibility checker's before/after reports.
//!
//! ## Why a client library?
//!
//! The service itself is a storage-triggered pipeline. Everything a user
//! does (checking quota, uploading under a unique name, waiting for an
//! output key to appear, presigning downloads) happens on the client side
//! against object storage and two small HTTP APIs. This crate owns that
//! orchestration so a terminal tool, a test harness or another front end
//! can drive it the same way.
//!
//! ## Flow Overview
//!
//! ```text
//! ID token
//!  │
//!  ├─ 1. Identity    token → temporary storage credentials
//!  ├─ 2. Quota       check usage and limits
//!  ├─ 3. Upload      validate (type, size, pages) → increment → PUT
//!  ├─ 4. Processing  poll for the output key (15 s × 120) → presign
//!  └─ 5. Results     download, fetch before/after reports, reconcile
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_remediate::{
//!     read_local, ClientConfig, HttpQuotaClient, IdToken, IdentityPoolClient, OutputFormat,
//!     ProcessingOutcome, ProcessingSession, QuotaApi, S3Store, UploadController,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::from_env()?;
//!     let token = IdToken::parse(std::env::var("ID_TOKEN")?)?;
//!
//!     let creds = IdentityPoolClient::new(&config).await?.credentials_for(&token).await?;
//!     let store = Arc::new(S3Store::new(&config, creds)?);
//!     let quota = Arc::new(HttpQuotaClient::new(&config)?);
//!
//!     let usage = quota.check(&token, OutputFormat::Pdf).await?;
//!     let uploader = UploadController::new(config.clone(), store.clone(), quota);
//!     let receipt = uploader
//!         .upload(&token, read_local("report.pdf").await?, OutputFormat::Pdf, &usage)
//!         .await?;
//!
//!     let handle = ProcessingSession::new(&config, store, &receipt)?.spawn();
//!     if let ProcessingOutcome::Ready(result) = handle.wait().await {
//!         println!("{}", result.download_url);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `remediate` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-remediate = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod format;
pub mod identity;
pub mod onboarding;
pub mod processing;
pub mod progress;
pub mod quota;
pub mod report;
pub mod results;
pub mod sanitize;
pub mod storage;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ClientConfig, ClientConfigBuilder, FormatAvailability, PollingConfig, ReportConfig,
    UploadLimits,
};
pub use error::RemediateError;
pub use format::{FormatProfile, OutputFormat};
pub use identity::{IdToken, IdentityPoolClient, StorageCredentials};
pub use onboarding::{OnboardingClient, OnboardingProfile};
pub use processing::{
    PollingState, ProcessingHandle, ProcessingOutcome, ProcessingSession, PROCESSING_STEPS,
};
pub use progress::{NoopProgressCallback, ProcessingProgressCallback, ProgressCallback};
pub use quota::{HttpQuotaClient, QuotaApi, QuotaMode, UsageSnapshot};
pub use report::{AccessibilityReport, ReportComparison, ReportFetcher, ReportKind, ReportPair};
pub use results::{format_processing_time, Downloader, ProcessedResult};
pub use storage::{MemoryStore, ObjectStore, S3Store};
pub use upload::{read_local, SelectedFile, UploadController, UploadReceipt, UploadTask};
