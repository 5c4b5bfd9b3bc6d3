//! Local filesystem bucket

use std::path::PathBuf;

use async_trait::async_trait;
use axum::body::Bytes;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::types::{BlobBucket, StorageError};

/// Directory-backed bucket with a two-character fan-out
#[derive(Debug, Clone)]
pub struct LocalBucket {
    base_path: PathBuf,
}

impl LocalBucket {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        // Content-addressable storage: first 2 chars as directory
        let (prefix, rest) = key.split_at(2.min(key.len()));
        self.base_path.join(prefix).join(rest)
    }
}

#[async_trait]
impl BlobBucket for LocalBucket {
    async fn download(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        match tokio::fs::read(self.object_path(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        let path = self.object_path(key);
        if tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write aside, fsync, then rename so readers never see a partial
        // object and concurrent writers of the same key converge.
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.object_path(key)).await?)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_download() {
        let temp_dir = TempDir::new().unwrap();
        let bucket = LocalBucket::new(temp_dir.path());

        assert_eq!(bucket.download("abcdef").await.unwrap(), None);
        assert!(!bucket.exists("abcdef").await.unwrap());

        bucket.upload("abcdef", Bytes::from_static(b"payload")).await.unwrap();

        assert!(temp_dir.path().join("ab").join("cdef").exists());
        assert_eq!(
            bucket.download("abcdef").await.unwrap(),
            Some(Bytes::from_static(b"payload"))
        );
        assert!(bucket.exists("abcdef").await.unwrap());
    }

    #[tokio::test]
    async fn test_repeated_upload_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let bucket = LocalBucket::new(temp_dir.path());

        bucket.upload("aa11", Bytes::from_static(b"same")).await.unwrap();
        bucket.upload("aa11", Bytes::from_static(b"same")).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path().join("aa")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
