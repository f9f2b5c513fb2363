//! Results stage: the download link and saving it to disk.

use crate::config::ClientConfig;
use crate::error::RemediateError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Output of a successful processing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedResult {
    /// Presigned, time-limited download URL.
    pub download_url: String,
    /// Rounded seconds from upload hand-off to readiness.
    pub processing_time_secs: Option<i64>,
    /// Name the download is saved under by default.
    pub download_filename: Option<String>,
}

impl ProcessedResult {
    pub fn new(download_url: impl Into<String>, processing_time_secs: Option<i64>) -> Self {
        Self {
            download_url: download_url.into(),
            processing_time_secs,
            download_filename: None,
        }
    }

    pub fn with_download_filename(mut self, name: impl Into<String>) -> Self {
        self.download_filename = Some(name.into());
        self
    }

    /// Human-readable processing time.
    pub fn processing_time_label(&self) -> String {
        format_processing_time(self.processing_time_secs)
    }
}

/// `{m}m {s}s`, `{s}s`, or "Processing completed" when unknown or zero.
pub fn format_processing_time(seconds: Option<i64>) -> String {
    match seconds {
        Some(s) if s > 0 => {
            let (mins, secs) = (s / 60, s % 60);
            if mins > 0 {
                format!("{mins}m {secs}s")
            } else {
                format!("{secs}s")
            }
        }
        _ => "Processing completed".to_string(),
    }
}

/// Fetches a processed result and writes it to disk.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: reqwest::Client,
}

impl Downloader {
    pub fn new(config: &ClientConfig) -> Result<Self, RemediateError> {
        // Downloads can be large; allow ten times the API timeout.
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout() * 10)
            .build()
            .map_err(|e| RemediateError::Internal(e.to_string()))?;
        Ok(Self { http })
    }

    /// Download `result` into `dir`, or to `path` when it names a file.
    ///
    /// Returns the final path and the number of bytes written.
    pub async fn save(
        &self,
        result: &ProcessedResult,
        destination: impl AsRef<Path>,
    ) -> Result<(PathBuf, u64), RemediateError> {
        let destination = destination.as_ref();
        let path = match (&result.download_filename, destination.is_dir()) {
            (Some(name), true) => destination.join(name),
            _ => destination.to_path_buf(),
        };

        let url = &result.download_url;
        let failed = |reason: String| RemediateError::DownloadFailed {
            url: redact_query(url),
            reason,
        };
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }
        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

        write_atomic(&path, &bytes).await?;
        info!("Saved {} bytes to {}", bytes.len(), path.display());
        Ok((path, bytes.len() as u64))
    }
}

/// Presigned URLs carry credentials in the query; keep them out of errors.
fn redact_query(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

/// Write `bytes` to `path` through a temporary sibling file and a rename, so
/// a partial download never appears under the final name.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RemediateError> {
    let write_failed = |source| RemediateError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".part");
    let tmp_path = path.with_file_name(tmp_name);

    let written = match tokio::fs::write(&tmp_path, bytes).await {
        Ok(()) => tokio::fs::rename(&tmp_path, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        // Best effort; the write error is what matters.
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_time_labels() {
        assert_eq!(format_processing_time(Some(125)), "2m 5s");
        assert_eq!(format_processing_time(Some(60)), "1m 0s");
        assert_eq!(format_processing_time(Some(42)), "42s");
        assert_eq!(format_processing_time(Some(0)), "Processing completed");
        assert_eq!(format_processing_time(Some(-3)), "Processing completed");
        assert_eq!(format_processing_time(None), "Processing completed");
    }

    #[test]
    fn redacts_signature() {
        assert_eq!(
            redact_query("https://b.s3.amazonaws.com/k.pdf?X-Amz-Signature=abc"),
            "https://b.s3.amazonaws.com/k.pdf"
        );
    }

    #[tokio::test]
    async fn atomic_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/COMPLIANT_a.pdf");
        write_atomic(&path, b"%PDF-1.7").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
        assert!(!dir.path().join("nested/out/COMPLIANT_a.pdf.part").exists());
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_part_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory under the target name makes the rename fail.
        let path = dir.path().join("COMPLIANT_a.pdf");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let err = write_atomic(&path, b"%PDF-1.7").await.unwrap_err();
        assert!(matches!(err, RemediateError::OutputWriteFailed { .. }));
        assert!(!dir.path().join("COMPLIANT_a.pdf.part").exists());
        assert!(path.join("keep").exists());
    }
}
