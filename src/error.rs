//! Error types for the pdf-remediate library.
//!
//! Only failures that stop a user-initiated action are errors:
//!
//! * [`RemediateError`] — **Fatal** for the current action: the file was
//!   rejected before upload, the quota service refused the increment, the
//!   storage write failed, or the configuration is unusable. Returned as
//!   `Err(RemediateError)` from controllers and clients.
//!
//! Failures while *waiting* for the remediated output are not errors. The
//! processing session swallows them, retries up to its attempt ceiling and
//! reports the terminal state as a value
//! ([`crate::processing::ProcessingOutcome`]).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-remediate library.
#[derive(Debug, Error)]
pub enum RemediateError {
    // ── Input / validation errors ─────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file is not a PDF (wrong declared type or wrong magic bytes).
    #[error("Only PDF files are allowed: '{path}' ({detail})")]
    NotAPdf { path: PathBuf, detail: String },

    /// The file exceeds the per-user size ceiling.
    #[error("File size exceeds the {limit_mb} MB limit ({size_bytes} bytes)")]
    FileTooLarge { size_bytes: u64, limit_mb: u64 },

    /// The PDF has more pages than the per-user maximum.
    #[error("PDF file cannot exceed {limit} pages (document has {pages})")]
    TooManyPages { pages: usize, limit: usize },

    /// The PDF could not be parsed to count its pages.
    #[error("Unable to read the PDF file '{path}': {detail}")]
    UnreadablePdf { path: PathBuf, detail: String },

    // ── Format availability ───────────────────────────────────────────────
    /// The bucket backing this output format is not configured.
    #[error("{format} bucket not configured. Please install the required infrastructure first.")]
    FormatUnavailable { format: String },

    /// The service is in maintenance mode.
    #[error("The remediation service is currently under maintenance. Please try again later.")]
    Maintenance,

    // ── Quota errors ──────────────────────────────────────────────────────
    /// The user already used every upload their plan allows.
    #[error("You have reached the upload limit of {limit} files. Please contact support for further assistance.")]
    QuotaExceeded { limit: u32 },

    /// The quota API answered with a non-2xx status.
    #[error("Quota service returned HTTP {status}: {message}")]
    QuotaRejected { status: u16, message: String },

    /// The quota API could not be reached or answered garbage.
    #[error("Quota request failed: {0}")]
    QuotaUnavailable(String),

    // ── Onboarding errors ─────────────────────────────────────────────────
    /// The first-sign-in API answered with a non-2xx status.
    #[error("Profile update rejected (HTTP {status}): {message}")]
    OnboardingRejected { status: u16, message: String },

    /// A required profile field was left blank.
    #[error("'{field}' is required. If it does not apply, enter N/A.")]
    IncompleteProfile { field: &'static str },

    // ── Identity errors ───────────────────────────────────────────────────
    /// The ID token could not be decoded.
    #[error("Invalid ID token: {0}")]
    InvalidToken(String),

    /// A required claim is absent from the ID token.
    #[error("User identifier not found in ID token (missing claim '{claim}'). Are you logged in?")]
    MissingClaim { claim: String },

    /// Exchanging the ID token for storage credentials failed.
    #[error("Credential exchange failed: {0}")]
    CredentialsUnavailable(String),

    // ── Storage errors ────────────────────────────────────────────────────
    /// Object storage answered with an unexpected status.
    #[error("Storage {operation} '{bucket}/{key}' failed with HTTP {status}")]
    StorageStatus {
        operation: &'static str,
        bucket: String,
        key: String,
        status: u16,
    },

    /// The request never produced a response (DNS, TLS, timeout, …).
    #[error("Storage {operation} '{bucket}/{key}' failed: {reason}")]
    StorageTransport {
        operation: &'static str,
        bucket: String,
        key: String,
        reason: String,
    },

    /// A downloaded report was not the JSON document the pipeline writes.
    #[error("Malformed report '{key}': {detail}")]
    MalformedReport { key: String, detail: String },

    /// Fetching a download URL failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the downloaded output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RemediateError {
    /// `true` for the rejections that happen before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RemediateError::FileNotFound { .. }
                | RemediateError::PermissionDenied { .. }
                | RemediateError::NotAPdf { .. }
                | RemediateError::FileTooLarge { .. }
                | RemediateError::TooManyPages { .. }
                | RemediateError::UnreadablePdf { .. }
        )
    }

    /// `true` when the object simply does not exist (HTTP 404 / 403 from a
    /// HEAD on a missing key without list permission).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RemediateError::StorageStatus { status: 404, .. }
                | RemediateError::StorageStatus { status: 403, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_pages_display() {
        let e = RemediateError::TooManyPages {
            pages: 11,
            limit: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("10 pages"), "got: {msg}");
        assert!(msg.contains("11"), "got: {msg}");
    }

    #[test]
    fn quota_exceeded_display() {
        let e = RemediateError::QuotaExceeded { limit: 3 };
        assert!(e.to_string().contains("upload limit of 3"));
    }

    #[test]
    fn storage_status_display() {
        let e = RemediateError::StorageStatus {
            operation: "HEAD",
            bucket: "pdf-bucket".into(),
            key: "result/COMPLIANT_a.pdf".into(),
            status: 404,
        };
        let msg = e.to_string();
        assert!(msg.contains("HEAD"));
        assert!(msg.contains("pdf-bucket/result/COMPLIANT_a.pdf"));
        assert!(e.is_not_found());
    }

    #[test]
    fn validation_classification() {
        assert!(RemediateError::FileTooLarge {
            size_bytes: 1,
            limit_mb: 0
        }
        .is_validation());
        assert!(!RemediateError::QuotaExceeded { limit: 3 }.is_validation());
        assert!(!RemediateError::Maintenance.is_validation());
    }
}
