//! Upload stage: validate → reserve quota → store → hand off.
//!
//! ```text
//! SelectedFile ─▶ format available? ─▶ PDF? ─▶ size ─▶ pages ─▶ usage < max
//!                                                                   │
//!              UploadReceipt ◀─ refresh usage ◀─ PUT ◀─ quota increment
//! ```
//!
//! Every rejection before the increment happens locally; nothing reaches
//! the network until the file has passed all checks. The PUT happens
//! exactly once, and only after the quota service accepted the increment.

pub mod input;
pub mod validate;

pub use input::{read_local, SelectedFile};

use crate::config::ClientConfig;
use crate::error::RemediateError;
use crate::format::{FormatProfile, OutputFormat};
use crate::identity::IdToken;
use crate::quota::{QuotaApi, UsageSnapshot};
use crate::sanitize::sanitize_user;
use crate::storage::ObjectStore;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// A validated file about to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTask {
    pub original_name: String,
    pub sanitized_name: String,
    pub format: OutputFormat,
    pub size_bytes: u64,
    pub page_count: usize,
}

impl UploadTask {
    /// Size in MiB, one decimal from 0.1 MiB up, two below.
    pub fn display_size_mb(&self) -> String {
        let mb = self.size_bytes as f64 / (1024.0 * 1024.0);
        if mb >= 0.1 {
            format!("{mb:.1}")
        } else {
            format!("{mb:.2}")
        }
    }
}

/// Proof of a successful upload; the only way into the processing stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Generated unique name, `{user}_{timestamp}_{file}`.
    pub object_name: String,
    /// Storage key including the format prefix.
    pub object_key: String,
    pub bucket: String,
    pub task: UploadTask,
    /// Counters after the upload, if the refresh succeeded.
    pub usage: Option<UsageSnapshot>,
    pub uploaded_at: DateTime<Utc>,
}

impl UploadReceipt {
    pub fn format(&self) -> OutputFormat {
        self.task.format
    }

    pub fn original_name(&self) -> &str {
        &self.task.original_name
    }

    pub fn sanitized_name(&self) -> &str {
        &self.task.sanitized_name
    }
}

/// `{user}_{YYYYMMDDHHMMSSmmm}_{file}`
pub fn build_object_name(user: &str, at: DateTime<Utc>, sanitized_file: &str) -> String {
    format!("{}_{}_{}", user, at.format("%Y%m%d%H%M%S%3f"), sanitized_file)
}

/// The 17-digit timestamp segment between user and file.
static RE_TIMESTAMP: Lazy<Regex> = Lazy::new(|| Regex::new(r"_\d{17}_").unwrap());

/// Inverse of [`build_object_name`]: the file part after the timestamp.
///
/// The user part may itself contain `_`, so the split anchors on the
/// timestamp. Names without one are returned whole.
pub fn file_name_from_object(object_name: &str) -> &str {
    RE_TIMESTAMP
        .find(object_name)
        .map(|m| &object_name[m.end()..])
        .filter(|rest| !rest.is_empty())
        .unwrap_or(object_name)
}

/// Drives one upload against storage and the quota service.
#[derive(Clone)]
pub struct UploadController {
    config: ClientConfig,
    store: Arc<dyn ObjectStore>,
    quota: Arc<dyn QuotaApi>,
}

impl UploadController {
    pub fn new(config: ClientConfig, store: Arc<dyn ObjectStore>, quota: Arc<dyn QuotaApi>) -> Self {
        Self {
            config,
            store,
            quota,
        }
    }

    /// Local checks only. Returns the task that would be uploaded.
    ///
    /// `usage` supplies the user's limits; pass the latest quota `check`.
    pub fn prepare(
        &self,
        file: &SelectedFile,
        format: OutputFormat,
        usage: &UsageSnapshot,
    ) -> Result<(FormatProfile, UploadTask), RemediateError> {
        if self.config.maintenance_mode {
            return Err(RemediateError::Maintenance);
        }
        let profile = FormatProfile::resolve(&self.config, format)?;
        let limits = usage.limits();
        let page_count = validate::validate(file, &limits)?;

        if !usage.has_capacity() {
            return Err(RemediateError::QuotaExceeded {
                limit: usage.max_files_allowed,
            });
        }

        let task = UploadTask {
            original_name: file.name().to_string(),
            sanitized_name: profile.sanitize_filename(file.name()),
            format,
            size_bytes: file.size_bytes(),
            page_count,
        };
        Ok((profile, task))
    }

    /// Validate, reserve one upload, store the file and refresh usage.
    pub async fn upload(
        &self,
        token: &IdToken,
        file: SelectedFile,
        format: OutputFormat,
        usage: &UsageSnapshot,
    ) -> Result<UploadReceipt, RemediateError> {
        let (profile, task) = self.prepare(&file, format, usage)?;
        token.sub()?;

        // ── Reserve ──────────────────────────────────────────────────────
        self.quota.increment(token, format).await?;

        // ── Store ────────────────────────────────────────────────────────
        let uploaded_at = Utc::now();
        let object_name = build_object_name(
            &sanitize_user(token.email()),
            uploaded_at,
            &task.sanitized_name,
        );
        let object_key = profile.upload_key(&object_name);
        info!(
            "Uploading '{}' ({} MB, {} pages) to {}/{}",
            task.original_name,
            task.display_size_mb(),
            task.page_count,
            profile.bucket(),
            object_key
        );
        self.store
            .put_object(profile.bucket(), &object_key, file.into_bytes(), input::PDF_MIME)
            .await?;

        // ── Refresh ──────────────────────────────────────────────────────
        let usage = match self.quota.check(token, format).await {
            Ok(u) => Some(u),
            Err(e) => {
                warn!("Usage refresh failed after upload: {}", e);
                None
            }
        };

        Ok(UploadReceipt {
            object_name,
            object_key,
            bucket: profile.bucket().to_string(),
            task,
            usage,
            uploaded_at,
        })
    }
}
