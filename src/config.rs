//! Configuration for the remediation client.
//!
//! Every deployment-specific value (bucket names, API endpoints, identity
//! pool, maintenance flag) and every timing constant of the upload → poll →
//! report flow lives in [`ClientConfig`]. The config is built once, either
//! through [`ClientConfig::builder()`] or [`ClientConfig::from_env()`], and
//! handed to each component at construction. Nothing reads the environment
//! after that point.

use crate::error::RemediateError;
use crate::format::OutputFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable prefix used by [`ClientConfig::from_env`].
pub const ENV_PREFIX: &str = "PDF_REMEDIATE_";

/// Sentinel some deployments write for an unset bucket.
const NULL_BUCKET: &str = "Null";

/// Configuration for the remediation client.
///
/// # Example
/// ```rust
/// use pdf_remediate::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .region("us-west-2")
///     .pdf_bucket("pdf-remediation-bucket")
///     .quota_api_url("https://api.example.com/upload-quota")
///     .build()
///     .unwrap();
/// assert!(config.bucket_for(pdf_remediate::OutputFormat::Pdf).is_some());
/// assert!(config.bucket_for(pdf_remediate::OutputFormat::Html).is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Region of the buckets and the identity pool. Default: `us-east-1`.
    pub region: String,

    /// Bucket for the PDF → PDF format. `None` marks the format unavailable.
    pub pdf_bucket: Option<String>,

    /// Bucket for the PDF → HTML format. `None` marks the format unavailable.
    pub html_bucket: Option<String>,

    /// Quota endpoint (`check` / `increment`).
    pub quota_api_url: Option<String>,

    /// First-sign-in profile endpoint.
    pub first_sign_in_api_url: Option<String>,

    /// Identity pool exchanging ID tokens for storage credentials.
    pub identity_pool_id: Option<String>,

    /// Token issuer, used as the key of the identity-pool logins map.
    pub authority: Option<String>,

    /// Override the storage endpoint (path-style addressing), e.g. for a
    /// local S3-compatible server.
    pub storage_endpoint: Option<String>,

    /// Refuse every user action while set.
    pub maintenance_mode: bool,

    /// Timeout applied to every HTTP request, in seconds. Default: 30.
    pub http_timeout_secs: u64,

    /// Processing-session timing.
    pub polling: PollingConfig,

    /// Report fetch retry policy.
    pub reports: ReportConfig,

    /// Limits used until the quota service reports the user's own.
    pub default_limits: UploadLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            pdf_bucket: None,
            html_bucket: None,
            quota_api_url: None,
            first_sign_in_api_url: None,
            identity_pool_id: None,
            authority: None,
            storage_endpoint: None,
            maintenance_mode: false,
            http_timeout_secs: 30,
            polling: PollingConfig::default(),
            reports: ReportConfig::default(),
            default_limits: UploadLimits::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read `PDF_REMEDIATE_*` variables from the process environment.
    pub fn from_env() -> Result<Self, RemediateError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    ///
    /// Recognised keys (all prefixed with [`ENV_PREFIX`]): `REGION`,
    /// `PDF_BUCKET`, `HTML_BUCKET`, `QUOTA_API`, `FIRST_SIGN_IN_API`,
    /// `IDENTITY_POOL_ID`, `AUTHORITY`, `S3_ENDPOINT`, `MAINTENANCE_MODE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RemediateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut builder = Self::builder();
        if let Some(region) = var("REGION") {
            builder = builder.region(region);
        }
        let mut config = builder.build()?;

        config.pdf_bucket = var("PDF_BUCKET").and_then(normalise_bucket);
        config.html_bucket = var("HTML_BUCKET").and_then(normalise_bucket);
        config.quota_api_url = var("QUOTA_API");
        config.first_sign_in_api_url = var("FIRST_SIGN_IN_API");
        config.identity_pool_id = var("IDENTITY_POOL_ID");
        config.authority = var("AUTHORITY");
        config.storage_endpoint = var("S3_ENDPOINT");
        config.maintenance_mode = var("MAINTENANCE_MODE").is_some_and(|v| v == "true");

        Ok(config)
    }

    /// Bucket configured for `format`, if any.
    pub fn bucket_for(&self, format: OutputFormat) -> Option<&str> {
        match format {
            OutputFormat::Pdf => self.pdf_bucket.as_deref(),
            OutputFormat::Html => self.html_bucket.as_deref(),
        }
    }

    /// Which formats can be used with this deployment.
    pub fn availability(&self) -> FormatAvailability {
        FormatAvailability {
            pdf: self.pdf_bucket.is_some(),
            html: self.html_bucket.is_some(),
        }
    }

    /// Timeout for every HTTP request made by the client.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn normalise_bucket(value: String) -> Option<String> {
    if value == NULL_BUCKET {
        None
    } else {
        Some(value)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    pub fn pdf_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.pdf_bucket = normalise_bucket(bucket.into());
        self
    }

    pub fn html_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.html_bucket = normalise_bucket(bucket.into());
        self
    }

    pub fn quota_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.quota_api_url = Some(url.into());
        self
    }

    pub fn first_sign_in_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.first_sign_in_api_url = Some(url.into());
        self
    }

    pub fn identity_pool_id(mut self, id: impl Into<String>) -> Self {
        self.config.identity_pool_id = Some(id.into());
        self
    }

    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.config.authority = Some(authority.into());
        self
    }

    pub fn storage_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.storage_endpoint = Some(endpoint.into());
        self
    }

    pub fn maintenance_mode(mut self, on: bool) -> Self {
        self.config.maintenance_mode = on;
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_timeout_secs = secs.max(1);
        self
    }

    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.config.polling = polling;
        self
    }

    pub fn reports(mut self, reports: ReportConfig) -> Self {
        self.config.reports = reports;
        self
    }

    pub fn default_limits(mut self, limits: UploadLimits) -> Self {
        self.config.default_limits = limits;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, RemediateError> {
        let c = &self.config;
        if c.region.trim().is_empty() {
            return Err(RemediateError::InvalidConfig("region must not be empty".into()));
        }
        if c.polling.max_attempts == 0 {
            return Err(RemediateError::InvalidConfig(
                "polling.max_attempts must be ≥ 1".into(),
            ));
        }
        if c.polling.check_interval_ms == 0
            || c.polling.clock_tick_ms == 0
            || c.polling.step_interval_ms == 0
        {
            return Err(RemediateError::InvalidConfig(
                "polling intervals must be non-zero".into(),
            ));
        }
        if c.reports.max_attempts == 0 {
            return Err(RemediateError::InvalidConfig(
                "reports.max_attempts must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Timing ───────────────────────────────────────────────────────────────

/// Timing of a processing session.
///
/// The defaults give the pipeline 120 × 15 s = 30 minutes to publish its
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between storage existence checks. Default: 15 000 ms.
    pub check_interval_ms: u64,

    /// Existence checks performed before the session gives up. Default: 120.
    pub max_attempts: u32,

    /// Elapsed-clock resolution. Default: 1 000 ms.
    pub clock_tick_ms: u64,

    /// Cosmetic step advance. Default: 1 200 ms.
    pub step_interval_ms: u64,

    /// Lifetime of the presigned download URL. Default: 30 000 s.
    pub presign_expiry_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 15_000,
            max_attempts: 120,
            clock_tick_ms: 1_000,
            step_interval_ms: 1_200,
            presign_expiry_secs: 30_000,
        }
    }
}

impl PollingConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn clock_tick(&self) -> Duration {
        Duration::from_millis(self.clock_tick_ms)
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }
}

/// Retry policy for the before/after accessibility reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Attempts per report. Default: 3.
    pub max_attempts: u32,

    /// Fixed delay between attempts. Default: 2 000 ms.
    pub retry_backoff_ms: u64,

    /// Lifetime of the presigned report URL. Default: 30 000 s.
    pub presign_expiry_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 2_000,
            presign_expiry_secs: 30_000,
        }
    }
}

// ── Limits & availability ────────────────────────────────────────────────

/// Per-user upload ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    /// Total uploads allowed. Default: 3.
    pub max_files: u32,
    /// Pages per PDF. Default: 10.
    pub max_pages: usize,
    /// File size in MiB. Default: 25.
    pub max_size_mb: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: 3,
            max_pages: 10,
            max_size_mb: 25,
        }
    }
}

impl UploadLimits {
    /// Size ceiling in bytes. Saturates, since the limit comes from the
    /// quota service.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Which output formats the deployment can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatAvailability {
    pub pdf: bool,
    pub html: bool,
}

impl FormatAvailability {
    /// Neither bucket is configured: the backend was never deployed.
    pub fn needs_full_deployment(&self) -> bool {
        !self.pdf && !self.html
    }

    pub fn is_available(&self, format: OutputFormat) -> bool {
        match format {
            OutputFormat::Pdf => self.pdf,
            OutputFormat::Html => self.html,
        }
    }
}
