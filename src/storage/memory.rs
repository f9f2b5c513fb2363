//! In-process [`ObjectStore`].
//!
//! Objects live in a map keyed by `(bucket, key)`. Every operation is
//! counted so callers can assert how often storage was touched.

use super::{ObjectMetadata, ObjectStore, PresignOptions};
use crate::error::RemediateError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    content_type: String,
}

/// Thread-safe in-memory object store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    failing: Mutex<HashSet<&'static str>>,
    puts: AtomicUsize,
    heads: AtomicUsize,
    gets: AtomicUsize,
    presigns: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<(String, String), StoredObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_failing(
        &self,
        operation: &'static str,
        bucket: &str,
        key: &str,
    ) -> Result<(), RemediateError> {
        let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing.contains(operation) {
            return Err(RemediateError::StorageStatus {
                operation,
                bucket: bucket.to_string(),
                key: key.to_string(),
                status: 500,
            });
        }
        Ok(())
    }

    /// Place an object directly, bypassing the put counter.
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.objects().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    /// Make every call of `operation` (`"PUT"`, `"HEAD"`, `"GET"`,
    /// `"PRESIGN"`) fail with HTTP 500 until [`MemoryStore::heal`].
    pub fn fail(&self, operation: &'static str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(operation);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Keys stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.content_type.clone())
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn head_count(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn presign_count(&self) -> usize {
        self.presigns.load(Ordering::SeqCst)
    }

    fn not_found(operation: &'static str, bucket: &str, key: &str) -> RemediateError {
        RemediateError::StorageStatus {
            operation,
            bucket: bucket.to_string(),
            key: key.to_string(),
            status: 404,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RemediateError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check_failing("PUT", bucket, key)?;
        self.objects().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, RemediateError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        self.check_failing("HEAD", bucket, key)?;
        self.objects()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| ObjectMetadata {
                content_length: Some(o.body.len() as u64),
                content_type: Some(o.content_type.clone()),
                ..ObjectMetadata::default()
            })
            .ok_or_else(|| Self::not_found("HEAD", bucket, key))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, RemediateError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_failing("GET", bucket, key)?;
        self.objects()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
            .ok_or_else(|| Self::not_found("GET", bucket, key))
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        options: &PresignOptions,
    ) -> Result<String, RemediateError> {
        self.presigns.fetch_add(1, Ordering::SeqCst);
        self.check_failing("PRESIGN", bucket, key)?;
        Ok(format!(
            "memory://{bucket}/{key}?expires={}",
            options.expires_in_secs
        ))
    }
}
