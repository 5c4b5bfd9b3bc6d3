//! Storage types

use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;

/// Bucket-level errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 SDK error: {0}")]
    SdkError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content-addressed blob bucket
///
/// Keys are never overwritten with different content, so uploads of an
/// existing key may either replace or skip.
#[async_trait]
pub trait BlobBucket: Send + Sync {
    /// Fetch an object; `None` when the key does not exist
    async fn download(&self, key: &str) -> Result<Option<Bytes>, StorageError>;

    /// Durably store an object; returns only once the write is acknowledged
    async fn upload(&self, key: &str, data: Bytes) -> Result<(), StorageError>;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.download(key).await?.is_some())
    }

    /// Backend name for logs
    fn name(&self) -> &'static str;
}
