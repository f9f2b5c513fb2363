//! Per-user upload quota.
//!
//! The quota service answers two questions with one endpoint:
//!
//! * `check` — how many uploads has this user made, and what are their limits?
//! * `increment` — reserve one more upload of the given conversion type.
//!
//! An upload is only written to storage after `increment` succeeds, so the
//! service's counter is never lower than the number of stored uploads.

use crate::config::{ClientConfig, UploadLimits};
use crate::error::RemediateError;
use crate::format::OutputFormat;
use crate::identity::IdToken;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Operation requested from the quota service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaMode {
    Check,
    Increment,
}

/// Usage counters and limits as reported by the quota service.
///
/// Absent fields take the service's documented defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    #[serde(default)]
    pub current_usage: u32,
    #[serde(default = "default_max_files")]
    pub max_files_allowed: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages_allowed: usize,
    #[serde(rename = "maxSizeAllowedMB", default = "default_max_size_mb")]
    pub max_size_allowed_mb: u64,
    #[serde(default)]
    pub pdf2pdf_count: u32,
    #[serde(default)]
    pub pdf2html_count: u32,
    /// Only present on `increment` responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_count: Option<u32>,
}

fn default_max_files() -> u32 {
    UploadLimits::default().max_files
}

fn default_max_pages() -> usize {
    UploadLimits::default().max_pages
}

fn default_max_size_mb() -> u64 {
    UploadLimits::default().max_size_mb
}

impl Default for UsageSnapshot {
    fn default() -> Self {
        Self::from_limits(UploadLimits::default())
    }
}

impl UsageSnapshot {
    /// A zero-usage snapshot carrying `limits`.
    pub fn from_limits(limits: UploadLimits) -> Self {
        Self {
            current_usage: 0,
            max_files_allowed: limits.max_files,
            max_pages_allowed: limits.max_pages,
            max_size_allowed_mb: limits.max_size_mb,
            pdf2pdf_count: 0,
            pdf2html_count: 0,
            new_count: None,
        }
    }

    pub fn limits(&self) -> UploadLimits {
        UploadLimits {
            max_files: self.max_files_allowed,
            max_pages: self.max_pages_allowed,
            max_size_mb: self.max_size_allowed_mb,
        }
    }

    /// Uploads left before the limit.
    pub fn remaining(&self) -> u32 {
        self.max_files_allowed.saturating_sub(self.current_usage)
    }

    pub fn has_capacity(&self) -> bool {
        self.current_usage < self.max_files_allowed
    }

    /// Conversions of `format` performed so far.
    pub fn count_for(&self, format: OutputFormat) -> u32 {
        match format {
            OutputFormat::Pdf => self.pdf2pdf_count,
            OutputFormat::Html => self.pdf2html_count,
        }
    }
}

/// The quota service.
#[async_trait]
pub trait QuotaApi: Send + Sync {
    /// Perform `mode` for the token's user and `format`.
    async fn request(
        &self,
        token: &IdToken,
        mode: QuotaMode,
        format: OutputFormat,
    ) -> Result<UsageSnapshot, RemediateError>;

    /// Read the current counters.
    async fn check(
        &self,
        token: &IdToken,
        format: OutputFormat,
    ) -> Result<UsageSnapshot, RemediateError> {
        self.request(token, QuotaMode::Check, format).await
    }

    /// Reserve one upload.
    async fn increment(
        &self,
        token: &IdToken,
        format: OutputFormat,
    ) -> Result<UsageSnapshot, RemediateError> {
        self.request(token, QuotaMode::Increment, format).await
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuotaRequest<'a> {
    sub: &'a str,
    mode: QuotaMode,
    conversion_type: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotaErrorBody {
    message: Option<String>,
    max_files_allowed: Option<u32>,
}

/// HTTP client for the quota endpoint.
#[derive(Debug, Clone)]
pub struct HttpQuotaClient {
    http: reqwest::Client,
    url: String,
    default_limits: UploadLimits,
}

impl HttpQuotaClient {
    pub fn new(config: &ClientConfig) -> Result<Self, RemediateError> {
        let url = config
            .quota_api_url
            .clone()
            .ok_or_else(|| RemediateError::InvalidConfig("quota API URL is not configured".into()))?;
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| RemediateError::Internal(e.to_string()))?;
        Ok(Self {
            http,
            url,
            default_limits: config.default_limits,
        })
    }
}

#[async_trait]
impl QuotaApi for HttpQuotaClient {
    async fn request(
        &self,
        token: &IdToken,
        mode: QuotaMode,
        format: OutputFormat,
    ) -> Result<UsageSnapshot, RemediateError> {
        let body = QuotaRequest {
            sub: token.sub()?,
            mode,
            conversion_type: format.as_str(),
        };
        debug!("Quota {:?} for {}", mode, format);

        let response = self
            .http
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", token.bearer()))
            .json(&body)
            .send()
            .await
            .map_err(|e| RemediateError::QuotaUnavailable(e.to_string()))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemediateError::QuotaUnavailable(e.to_string()))?;

        let usage = interpret_response(status, &bytes, mode, self.default_limits)?;
        if mode == QuotaMode::Increment {
            info!(
                "Quota incremented: {}/{} uploads used",
                usage.new_count.unwrap_or(usage.current_usage),
                usage.max_files_allowed
            );
        }
        Ok(usage)
    }
}

/// Map a quota response to a snapshot or the matching error.
///
/// 403 means the user is at their limit; any other non-2xx surfaces the
/// server's `message`.
pub(crate) fn interpret_response(
    status: u16,
    body: &[u8],
    mode: QuotaMode,
    default_limits: UploadLimits,
) -> Result<UsageSnapshot, RemediateError> {
    if (200..300).contains(&status) {
        return serde_json::from_slice(body)
            .map_err(|e| RemediateError::QuotaUnavailable(format!("unexpected response: {e}")));
    }

    let err: QuotaErrorBody = serde_json::from_slice(body).unwrap_or_default();
    if status == 403 {
        return Err(RemediateError::QuotaExceeded {
            limit: err.max_files_allowed.unwrap_or(default_limits.max_files),
        });
    }
    let fallback = match mode {
        QuotaMode::Check => "Error fetching usage",
        QuotaMode::Increment => "Error updating usage count",
    };
    Err(RemediateError::QuotaRejected {
        status,
        message: err.message.unwrap_or_else(|| fallback.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let usage: UsageSnapshot = serde_json::from_str(r#"{"currentUsage": 2}"#).unwrap();
        assert_eq!(usage.current_usage, 2);
        assert_eq!(usage.max_files_allowed, 3);
        assert_eq!(usage.max_pages_allowed, 10);
        assert_eq!(usage.max_size_allowed_mb, 25);
        assert_eq!(usage.remaining(), 1);
        assert!(usage.has_capacity());
    }

    #[test]
    fn full_response_parses() {
        let body = br#"{"currentUsage":3,"maxFilesAllowed":8,"maxPagesAllowed":20,
            "maxSizeAllowedMB":50,"pdf2pdfCount":2,"pdf2htmlCount":1,"newCount":3}"#;
        let usage = interpret_response(200, body, QuotaMode::Increment, UploadLimits::default())
            .unwrap();
        assert_eq!(usage.new_count, Some(3));
        assert_eq!(usage.count_for(OutputFormat::Html), 1);
        assert_eq!(usage.limits().max_pages, 20);
        assert_eq!(usage.limits().max_size_bytes(), 50 * 1024 * 1024);
    }

    #[test]
    fn forbidden_is_quota_exceeded() {
        let err = interpret_response(
            403,
            br#"{"message":"limit","maxFilesAllowed":8}"#,
            QuotaMode::Increment,
            UploadLimits::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RemediateError::QuotaExceeded { limit: 8 }));

        let err = interpret_response(403, b"", QuotaMode::Increment, UploadLimits::default())
            .unwrap_err();
        assert!(matches!(err, RemediateError::QuotaExceeded { limit: 3 }));
    }

    #[test]
    fn other_errors_surface_message() {
        let err = interpret_response(
            500,
            br#"{"message":"table unavailable"}"#,
            QuotaMode::Increment,
            UploadLimits::default(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Quota service returned HTTP 500: table unavailable");

        let err =
            interpret_response(502, b"<html>", QuotaMode::Check, UploadLimits::default()).unwrap_err();
        assert!(err.to_string().contains("Error fetching usage"));
    }

    #[test]
    fn garbage_success_body_is_unavailable() {
        let err = interpret_response(200, b"nope", QuotaMode::Check, UploadLimits::default())
            .unwrap_err();
        assert!(matches!(err, RemediateError::QuotaUnavailable(_)));
    }

    #[test]
    fn request_body_shape() {
        let body = QuotaRequest {
            sub: "abc",
            mode: QuotaMode::Increment,
            conversion_type: OutputFormat::Pdf.as_str(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"sub":"abc","mode":"increment","conversionType":"pdf"})
        );
    }
}
