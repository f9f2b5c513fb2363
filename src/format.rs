//! Output formats and the per-format capability descriptor.
//!
//! The service offers two conversions that differ in where files live and
//! how keys are named:
//!
//! | | PDF → PDF | PDF → HTML |
//! |---|---|---|
//! | upload prefix | `pdf/` | `uploads/` |
//! | result key | `result/COMPLIANT_{name}` | `remediated/final_{sanitised name}.zip` |
//! | accessibility report | yes | no |
//!
//! [`FormatProfile`] resolves all of this once from the [`ClientConfig`] so
//! the controllers never branch on the format themselves.

use crate::config::ClientConfig;
use crate::error::RemediateError;
use crate::sanitize::{sanitize_filename, sanitize_object_key};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The conversion requested for an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Remediated, tagged PDF. (default)
    #[default]
    Pdf,
    /// Accessible HTML bundle delivered as a ZIP.
    Html,
}

impl OutputFormat {
    /// Wire value used by the quota API (`conversionType`).
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Html => "html",
        }
    }

    /// Short human label, e.g. `PDF → PDF`.
    pub fn flow_label(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "PDF → PDF",
            OutputFormat::Html => "PDF → HTML",
        }
    }

    /// Name of the bucket as shown in availability messages.
    pub fn bucket_label(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "PDF",
            OutputFormat::Html => "HTML",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = RemediateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(OutputFormat::Pdf),
            "html" => Ok(OutputFormat::Html),
            other => Err(RemediateError::InvalidConfig(format!(
                "unknown format '{other}' (expected pdf or html)"
            ))),
        }
    }
}

/// Everything a controller needs to know about one output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatProfile {
    format: OutputFormat,
    bucket: String,
}

impl FormatProfile {
    /// Resolve the profile for `format`, failing when its bucket is absent.
    pub fn resolve(config: &ClientConfig, format: OutputFormat) -> Result<Self, RemediateError> {
        let bucket = config
            .bucket_for(format)
            .ok_or_else(|| RemediateError::FormatUnavailable {
                format: format.bucket_label().to_string(),
            })?;
        Ok(Self {
            format,
            bucket: bucket.to_string(),
        })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Directory the upload lands in.
    pub fn upload_prefix(&self) -> &'static str {
        match self.format {
            OutputFormat::Pdf => "pdf/",
            OutputFormat::Html => "uploads/",
        }
    }

    /// Full key of the uploaded object.
    pub fn upload_key(&self, object_name: &str) -> String {
        format!("{}{}", self.upload_prefix(), object_name)
    }

    /// Sanitise a user-supplied file name for this format.
    pub fn sanitize_filename(&self, filename: &str) -> String {
        sanitize_filename(filename, self.format)
    }

    /// Key the pipeline writes the remediated output under.
    ///
    /// Only the HTML key goes through the object-key whitelist.
    pub fn result_key(&self, object_name: &str) -> String {
        match self.format {
            OutputFormat::Pdf => format!("result/COMPLIANT_{object_name}"),
            OutputFormat::Html => {
                let zip_name = object_name.replacen(".pdf", ".zip", 1);
                format!("remediated/final_{}", sanitize_object_key(&zip_name))
            }
        }
    }

    /// File name offered to the browser/disk when downloading the result.
    pub fn download_filename(&self, original_name: &str) -> String {
        match self.format {
            OutputFormat::Pdf => format!("COMPLIANT_{original_name}"),
            OutputFormat::Html => format!("final_{}", original_name.replacen(".pdf", ".zip", 1)),
        }
    }

    /// Whether the pipeline publishes before/after accessibility reports.
    pub fn has_accessibility_report(&self) -> bool {
        self.format == OutputFormat::Pdf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::builder()
            .pdf_bucket("pdf-bucket")
            .html_bucket("html-bucket")
            .build()
            .unwrap()
    }

    #[test]
    fn parse_formats() {
        assert_eq!("PDF".parse::<OutputFormat>().unwrap(), OutputFormat::Pdf);
        assert_eq!(" html ".parse::<OutputFormat>().unwrap(), OutputFormat::Html);
        assert!("docx".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&OutputFormat::Html).unwrap(), "\"html\"");
    }

    #[test]
    fn missing_bucket_is_unavailable() {
        let cfg = ClientConfig::builder().pdf_bucket("pdf-bucket").build().unwrap();
        let err = FormatProfile::resolve(&cfg, OutputFormat::Html).unwrap_err();
        assert!(matches!(err, RemediateError::FormatUnavailable { .. }));
        assert!(err.to_string().contains("HTML bucket"));
    }

    #[test]
    fn pdf_keys() {
        let p = FormatProfile::resolve(&config(), OutputFormat::Pdf).unwrap();
        assert_eq!(p.bucket(), "pdf-bucket");
        assert_eq!(p.upload_key("u_1_a b.pdf"), "pdf/u_1_a b.pdf");
        assert_eq!(p.result_key("u_1_a b.pdf"), "result/COMPLIANT_u_1_a b.pdf");
        assert_eq!(p.download_filename("a b.pdf"), "COMPLIANT_a b.pdf");
        assert!(p.has_accessibility_report());
    }

    #[test]
    fn html_keys_are_whitelisted() {
        let p = FormatProfile::resolve(&config(), OutputFormat::Html).unwrap();
        assert_eq!(p.bucket(), "html-bucket");
        assert_eq!(p.upload_key("u_1_doc.pdf"), "uploads/u_1_doc.pdf");
        assert_eq!(
            p.result_key("jane_20240101_my doc+v2.pdf"),
            "remediated/final_jane_20240101_my_doc_v2.zip"
        );
        assert_eq!(p.download_filename("doc.pdf"), "final_doc.zip");
        assert!(!p.has_accessibility_report());
    }
}
