//! Object storage access.
//!
//! Controllers talk to storage only through [`ObjectStore`], which keeps the
//! upload, polling and report logic independent of the transport:
//!
//! ```text
//! upload     ──▶ put_object
//! processing ──▶ exists (HEAD) ──▶ presign_get
//! report     ──▶ head_object ──▶ get_object ──▶ presign_get
//! ```
//!
//! * [`s3`]     — S3 client over `aws-sdk-s3`, with SDK presigning
//! * [`memory`] — in-process store for tests and dry runs

pub mod memory;
pub mod s3;

use crate::error::RemediateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;
pub use s3::S3Store;

/// Metadata returned by a HEAD request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Options for a presigned GET URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignOptions {
    /// URL lifetime in seconds.
    pub expires_in_secs: u64,
    /// `response-content-disposition` override.
    pub content_disposition: Option<String>,
}

impl PresignOptions {
    /// Force a download named `filename`.
    pub fn attachment(filename: &str, expires_in_secs: u64) -> Self {
        Self {
            expires_in_secs,
            content_disposition: Some(format!("attachment; filename=\"{filename}\"")),
        }
    }
}

/// Bucket/key object storage as used by the remediation flow.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` under `bucket/key`.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RemediateError>;

    /// Fetch object metadata. Missing objects yield a 404 `StorageStatus`.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, RemediateError>;

    /// Fetch the object body.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, RemediateError>;

    /// Produce a time-limited GET URL.
    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        options: &PresignOptions,
    ) -> Result<String, RemediateError>;

    /// `Ok(false)` when the object is absent, `Err` for any other failure.
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, RemediateError> {
        match self.head_object(bucket, key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
