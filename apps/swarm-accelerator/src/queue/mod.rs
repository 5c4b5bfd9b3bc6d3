//! Upload propagation queue
//!
//! Chunks accepted locally are recorded here so a separate worker can later
//! push them to the origin network. This side only enqueues.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::PushQueueRepository;
use crate::swarm::UploadedChunkRef;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Push queue closed")]
    Closed,

    #[error("Push queue full")]
    Full,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Sink for locally accepted chunk references
#[async_trait]
pub trait ChunkPushQueue: Send + Sync {
    async fn enqueue(&self, chunk_ref: UploadedChunkRef) -> Result<(), QueueError>;
}

// ============================================================================
// Direct SQLite outbox
// ============================================================================

/// Writes every reference straight into the outbox table
#[derive(Clone)]
pub struct SqlitePushQueue {
    pool: SqlitePool,
}

impl SqlitePushQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChunkPushQueue for SqlitePushQueue {
    async fn enqueue(&self, chunk_ref: UploadedChunkRef) -> Result<(), QueueError> {
        PushQueueRepository::new(&self.pool).insert(&chunk_ref).await?;
        Ok(())
    }
}

// ============================================================================
// Background queue
// ============================================================================

/// Bounded in-memory channel drained into another queue by a background task
///
/// `enqueue` never waits on the database. When the channel is full the
/// reference is rejected with `QueueError::Full`, so at most `capacity`
/// references are held in memory.
#[derive(Clone)]
pub struct BackgroundPushQueue {
    tx: mpsc::Sender<UploadedChunkRef>,
}

impl BackgroundPushQueue {
    /// Spawn the drainer task
    ///
    /// The task exits once every sender has been dropped and the channel is
    /// empty.
    pub fn spawn<Q>(sink: Q, capacity: usize) -> (Self, JoinHandle<()>)
    where
        Q: ChunkPushQueue + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(Self::drain(sink, rx));
        (Self { tx }, task)
    }

    async fn drain<Q: ChunkPushQueue>(sink: Q, mut rx: mpsc::Receiver<UploadedChunkRef>) {
        let mut drained = 0u64;
        while let Some(chunk_ref) = rx.recv().await {
            let hash = chunk_ref.hash;
            match sink.enqueue(chunk_ref).await {
                Ok(()) => drained += 1,
                Err(e) => tracing::warn!(hash = %hash, error = %e, "Failed to persist push queue entry"),
            }
        }
        tracing::debug!(drained, "Push queue drainer stopped");
    }
}

#[async_trait]
impl ChunkPushQueue for BackgroundPushQueue {
    async fn enqueue(&self, chunk_ref: UploadedChunkRef) -> Result<(), QueueError> {
        match self.tx.try_send(chunk_ref) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(QueueError::Full),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;
    use crate::swarm::{PostageBatchId, SwarmHash, TagId};
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn chunk_ref(byte: u8) -> UploadedChunkRef {
        UploadedChunkRef::new(
            SwarmHash::from_bytes([byte; 32]),
            PostageBatchId::from_bytes([0xbbu8; 32]),
            Some(TagId(byte as u64)),
        )
    }

    #[tokio::test]
    async fn test_sqlite_queue_persists() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let queue = SqlitePushQueue::new(pool.clone());

        queue.enqueue(chunk_ref(1)).await.unwrap();

        let rows = PushQueueRepository::new(&pool).list(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].hash, SwarmHash::from_bytes([1u8; 32]).to_string());
        assert_eq!(rows[0].tag_id, Some(1));
    }

    /// Sink that holds every entry until released
    struct StalledSink {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ChunkPushQueue for StalledSink {
        async fn enqueue(&self, _chunk_ref: UploadedChunkRef) -> Result<(), QueueError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_background_queue_drains_every_entry() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let (queue, task) = BackgroundPushQueue::spawn(SqlitePushQueue::new(pool.clone()), 8);

        for byte in 1..=5u8 {
            queue.enqueue(chunk_ref(byte)).await.unwrap();
        }
        drop(queue);
        task.await.unwrap();

        let rows = PushQueueRepository::new(&pool).list(10).await.unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn test_stalled_sink_keeps_queue_bounded() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let sink = StalledSink {
            entered: entered.clone(),
            release: release.clone(),
        };
        let (queue, task) = BackgroundPushQueue::spawn(sink, 1);

        // The drainer takes the first entry and blocks in the sink
        queue.enqueue(chunk_ref(1)).await.unwrap();
        entered.notified().await;

        // One more fits in the channel; everything after is rejected
        queue.enqueue(chunk_ref(2)).await.unwrap();
        for byte in 3..=50u8 {
            assert!(matches!(
                queue.enqueue(chunk_ref(byte)).await,
                Err(QueueError::Full)
            ));
        }
        assert_eq!(queue.tx.capacity(), 0);

        task.abort();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_closed_queue_reports_error() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let (queue, task) = BackgroundPushQueue::spawn(SqlitePushQueue::new(pool), 1);
        task.abort();
        let _ = task.await;

        assert!(matches!(
            queue.enqueue(chunk_ref(1)).await,
            Err(QueueError::Closed)
        ));
    }
}
