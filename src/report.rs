//! Accessibility reports for the PDF → PDF format.
//!
//! The pipeline runs an accessibility checker twice, before and after
//! remediation, and publishes each result as JSON next to its work files:
//!
//! ```text
//! temp/{stem}/accessability-report/{stem}_accessibility_report_before_remidiation.json
//! temp/{stem}/accessability-report/COMPLIANT_{stem}_accessibility_report_after_remidiation.json
//! ```
//!
//! The reports may land a little after the remediated PDF, so each one is
//! fetched with a small bounded retry (HEAD → GET → parse → presign per
//! attempt). Both are fetched concurrently and independently: one failing
//! does not affect the other.

use crate::config::{ClientConfig, ReportConfig};
use crate::error::RemediateError;
use crate::format::{FormatProfile, OutputFormat};
use crate::storage::{ObjectStore, PresignOptions};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Placeholder for a status the report does not contain.
pub const MISSING_STATUS: &str = "—";

// ── Report document ──────────────────────────────────────────────────────

/// Totals block of a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Needs manual check", default)]
    pub needs_manual_check: u64,
    #[serde(rename = "Passed", default)]
    pub passed: u64,
    #[serde(rename = "Failed", default)]
    pub failed: u64,
}

/// One checker rule and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    #[serde(rename = "Rule")]
    pub rule: String,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
}

/// Rules grouped under a category heading, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportCategory {
    pub name: String,
    pub rules: Vec<RuleResult>,
}

/// A checker report as written by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccessibilityReport {
    #[serde(rename = "Summary", default)]
    pub summary: Option<ReportSummary>,
    #[serde(
        rename = "Detailed Report",
        default,
        deserialize_with = "categories_in_order"
    )]
    pub categories: Vec<ReportCategory>,
}

impl AccessibilityReport {
    pub fn from_slice(key: &str, bytes: &[u8]) -> Result<Self, RemediateError> {
        serde_json::from_slice(bytes).map_err(|e| RemediateError::MalformedReport {
            key: key.to_string(),
            detail: e.to_string(),
        })
    }
}

/// Keep categories in the order the JSON object lists them.
fn categories_in_order<'de, D>(deserializer: D) -> Result<Vec<ReportCategory>, D::Error>
where
    D: Deserializer<'de>,
{
    struct CategoryVisitor;

    impl<'de> Visitor<'de> for CategoryVisitor {
        type Value = Vec<ReportCategory>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object of category name to rule list")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::new();
            while let Some((name, rules)) = map.next_entry::<String, Vec<RuleResult>>()? {
                out.push(ReportCategory { name, rules });
            }
            Ok(out)
        }
    }

    deserializer.deserialize_map(CategoryVisitor)
}

// ── Keys ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Before,
    After,
}

impl ReportKind {
    pub fn label(&self) -> &'static str {
        match self {
            ReportKind::Before => "before",
            ReportKind::After => "after",
        }
    }

    /// Storage key for the report of the upload named `object_name`.
    pub fn key(&self, object_name: &str) -> String {
        let stem = strip_pdf_extension(object_name);
        match self {
            ReportKind::Before => format!(
                "temp/{stem}/accessability-report/{stem}_accessibility_report_before_remidiation.json"
            ),
            ReportKind::After => format!(
                "temp/{stem}/accessability-report/COMPLIANT_{stem}_accessibility_report_after_remidiation.json"
            ),
        }
    }

    /// File name offered when downloading the report.
    pub fn download_filename(&self, original_name: &str) -> String {
        format!(
            "COMPLIANT_{}_{}_remediation_accessibility_report.json",
            strip_pdf_extension(original_name),
            self.label()
        )
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Drop one trailing `.pdf`, any case.
fn strip_pdf_extension(name: &str) -> &str {
    let len = name.len();
    if len >= 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".pdf") {
        &name[..len - 4]
    } else {
        name
    }
}

// ── Fetching ─────────────────────────────────────────────────────────────

/// A report that was fetched and presigned.
#[derive(Debug, Clone)]
pub struct FetchedReport {
    pub kind: ReportKind,
    pub key: String,
    pub report: AccessibilityReport,
    pub download_url: String,
    pub download_filename: String,
    /// Attempts used, 1-based.
    pub attempts: u32,
}

/// Outcome of fetching both reports. Each side fails independently.
#[derive(Debug)]
pub struct ReportPair {
    pub before: Result<FetchedReport, RemediateError>,
    pub after: Result<FetchedReport, RemediateError>,
}

impl ReportPair {
    pub fn comparison(&self) -> ReportComparison {
        ReportComparison::reconcile(
            self.before.as_ref().ok().map(|r| &r.report),
            self.after.as_ref().ok().map(|r| &r.report),
        )
    }
}

/// Fetches reports from the PDF bucket with bounded retry.
#[derive(Clone)]
pub struct ReportFetcher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    policy: ReportConfig,
}

impl ReportFetcher {
    /// Reports only exist for the PDF format, so the PDF bucket is required.
    pub fn new(config: &ClientConfig, store: Arc<dyn ObjectStore>) -> Result<Self, RemediateError> {
        let profile = FormatProfile::resolve(config, OutputFormat::Pdf)?;
        Ok(Self {
            store,
            bucket: profile.bucket().to_string(),
            policy: config.reports,
        })
    }

    /// Fetch one report, trying up to `max_attempts` times with a fixed
    /// backoff. Returns the last error when every attempt failed.
    pub async fn fetch(
        &self,
        kind: ReportKind,
        object_name: &str,
        original_name: &str,
    ) -> Result<FetchedReport, RemediateError> {
        let key = kind.key(object_name);
        let filename = kind.download_filename(original_name);
        let options = PresignOptions::attachment(&filename, self.policy.presign_expiry_secs);
        let backoff = Duration::from_millis(self.policy.retry_backoff_ms);

        let mut attempt = 1;
        loop {
            match self.attempt(&key, &options).await {
                Ok((report, download_url)) => {
                    info!("Fetched {} report on attempt {}", kind, attempt);
                    return Ok(FetchedReport {
                        kind,
                        key,
                        report,
                        download_url,
                        download_filename: filename,
                        attempts: attempt,
                    });
                }
                Err(e) if attempt >= self.policy.max_attempts => {
                    warn!("All {} attempts failed for {} report: {}", attempt, kind, e);
                    return Err(e);
                }
                Err(e) => {
                    debug!(
                        "Attempt {}/{} failed for {} report: {}",
                        attempt, self.policy.max_attempts, kind, e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        key: &str,
        options: &PresignOptions,
    ) -> Result<(AccessibilityReport, String), RemediateError> {
        self.store.head_object(&self.bucket, key).await?;
        let bytes = self.store.get_object(&self.bucket, key).await?;
        let report = AccessibilityReport::from_slice(key, &bytes)?;
        let url = self.store.presign_get(&self.bucket, key, options).await?;
        Ok((report, url))
    }

    /// Fetch the before and after reports concurrently.
    pub async fn fetch_both(&self, object_name: &str, original_name: &str) -> ReportPair {
        let (before, after) = tokio::join!(
            self.fetch(ReportKind::Before, object_name, original_name),
            self.fetch(ReportKind::After, object_name, original_name),
        );
        ReportPair { before, after }
    }
}

// ── Reconciliation ───────────────────────────────────────────────────────

/// One rule across both reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonRow {
    pub rule: String,
    /// From the after report when it has the rule, else the before report.
    pub description: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl ComparisonRow {
    pub fn before_label(&self) -> &str {
        status_label(self.before.as_deref())
    }

    pub fn after_label(&self) -> &str {
        status_label(self.after.as_deref())
    }
}

fn status_label(status: Option<&str>) -> &str {
    status.filter(|s| !s.is_empty()).unwrap_or(MISSING_STATUS)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonCategory {
    pub name: String,
    pub rows: Vec<ComparisonRow>,
}

/// Before/after reports merged into one rule-keyed table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportComparison {
    pub before_summary: Option<ReportSummary>,
    pub after_summary: Option<ReportSummary>,
    pub categories: Vec<ComparisonCategory>,
}

impl ReportComparison {
    /// Union of categories and rules, each in first-seen order with the
    /// before report read first.
    pub fn reconcile(
        before: Option<&AccessibilityReport>,
        after: Option<&AccessibilityReport>,
    ) -> Self {
        let mut categories: Vec<ComparisonCategory> = Vec::new();
        let mut category_index: HashMap<String, usize> = HashMap::new();
        let mut row_index: HashMap<(usize, String), usize> = HashMap::new();

        for (report, kind) in [(before, ReportKind::Before), (after, ReportKind::After)] {
            let Some(report) = report else { continue };
            for category in &report.categories {
                let ci = *category_index
                    .entry(category.name.clone())
                    .or_insert_with(|| {
                        categories.push(ComparisonCategory {
                            name: category.name.clone(),
                            rows: Vec::new(),
                        });
                        categories.len() - 1
                    });

                for item in &category.rules {
                    let rows = &mut categories[ci].rows;
                    let ri = *row_index.entry((ci, item.rule.clone())).or_insert_with(|| {
                        rows.push(ComparisonRow {
                            rule: item.rule.clone(),
                            description: None,
                            before: None,
                            after: None,
                        });
                        rows.len() - 1
                    });
                    let row = &mut rows[ri];
                    match kind {
                        ReportKind::Before => {
                            if row.before.is_none() {
                                row.before = item.status.clone();
                            }
                            if row.description.is_none() {
                                row.description = item.description.clone();
                            }
                        }
                        ReportKind::After => {
                            if row.after.is_none() {
                                row.after = item.status.clone();
                                row.description = item
                                    .description
                                    .clone()
                                    .or_else(|| row.description.take());
                            }
                        }
                    }
                }
            }
        }

        Self {
            before_summary: before.and_then(|r| r.summary.clone()),
            after_summary: after.and_then(|r| r.summary.clone()),
            categories,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.before_summary.is_none() && self.after_summary.is_none()
    }
}
