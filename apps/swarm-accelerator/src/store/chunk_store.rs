//! Chunk Store
//!
//! Content-addressed chunk cache over two tiers: inline records in the
//! metadata database (fast path) and the blob bucket (durable copy).

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::db::ChunkRepository;
use crate::storage::{BlobBucket, StorageError};
use crate::swarm::{SwarmChunk, SwarmHash};

/// Chunk store errors
///
/// A missing chunk is not an error: lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Chunk store unavailable: {0}")]
    Unavailable(String),

    #[error("Stored chunk {hash} is corrupt: {reason}")]
    Corrupt { hash: SwarmHash, reason: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(format!("database: {}", err))
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::Unavailable(format!("bucket: {}", err))
    }
}

/// Which tier served a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSource {
    Record,
    Bucket,
}

/// Content-addressed chunk store
#[derive(Clone)]
pub struct ChunkStore {
    inner: Arc<ChunkStoreInner>,
}

struct ChunkStoreInner {
    /// Metadata database holding inline chunk records
    db: SqlitePool,

    /// Durable payload bucket
    bucket: Arc<dyn BlobBucket>,

    /// Write inline records on put
    inline_records: bool,
}

impl ChunkStore {
    pub fn new(db: SqlitePool, bucket: Arc<dyn BlobBucket>, inline_records: bool) -> Self {
        Self {
            inner: Arc::new(ChunkStoreInner {
                db,
                bucket,
                inline_records,
            }),
        }
    }

    /// Look up a chunk; `Ok(None)` is a miss
    pub async fn get(&self, hash: &SwarmHash) -> Result<Option<SwarmChunk>, StoreError> {
        Ok(self.get_with_source(hash).await?.map(|(chunk, _)| chunk))
    }

    /// Look up a chunk, reporting which tier served it
    pub async fn get_with_source(
        &self,
        hash: &SwarmHash,
    ) -> Result<Option<(SwarmChunk, ChunkSource)>, StoreError> {
        if let Some(record) = ChunkRepository::new(&self.inner.db).get(hash).await? {
            let chunk = decode(*hash, record.payload)?;
            return Ok(Some((chunk, ChunkSource::Record)));
        }

        match self.inner.bucket.download(&hash.to_string()).await? {
            Some(payload) => {
                let chunk = decode(*hash, payload)?;
                Ok(Some((chunk, ChunkSource::Bucket)))
            }
            None => Ok(None),
        }
    }

    /// Store a chunk
    ///
    /// Idempotent: storing a chunk that is already present succeeds. The
    /// bucket write must be acknowledged for success; the inline record is a
    /// cache and its failure is only logged.
    pub async fn put(&self, chunk: &SwarmChunk) -> Result<(), StoreError> {
        let key = chunk.hash().to_string();

        self.inner
            .bucket
            .upload(&key, chunk.span_and_data().clone())
            .await?;

        if self.inner.inline_records {
            if let Err(e) = ChunkRepository::new(&self.inner.db)
                .insert(&chunk.hash(), chunk.span_and_data())
                .await
            {
                tracing::warn!(hash = %key, error = %e, "Failed to write inline chunk record");
            }
        }

        tracing::debug!(
            hash = %key,
            size = chunk.span_and_data().len(),
            bucket = self.inner.bucket.name(),
            "Chunk stored"
        );

        Ok(())
    }

    /// Check presence without loading the payload from the bucket
    pub async fn contains(&self, hash: &SwarmHash) -> Result<bool, StoreError> {
        if ChunkRepository::new(&self.inner.db).get(hash).await?.is_some() {
            return Ok(true);
        }
        Ok(self.inner.bucket.exists(&hash.to_string()).await?)
    }
}

fn decode(hash: SwarmHash, payload: impl Into<axum::body::Bytes>) -> Result<SwarmChunk, StoreError> {
    SwarmChunk::with_hash(hash, payload).map_err(|e| StoreError::Corrupt {
        hash,
        reason: e.to_string(),
    })
}
