//! Upload push queue (outbox) database operations
//!
//! Rows are written here when a chunk is accepted locally. A separate worker
//! drains them toward the origin network and deletes them once propagated.

use chrono::SecondsFormat;
use sqlx::SqlitePool;

use crate::swarm::UploadedChunkRef;

/// Queued chunk reference row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PushQueueRecord {
    pub id: String,
    pub hash: String,
    pub batch_id: String,
    pub tag_id: Option<i64>,
    pub created_at: String,
}

/// Push queue repository
pub struct PushQueueRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PushQueueRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an uploaded chunk reference
    pub async fn insert(&self, chunk_ref: &UploadedChunkRef) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunk_push_queue (id, hash, batch_id, tag_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(chunk_ref.id.to_string())
        .bind(chunk_ref.hash.to_string())
        .bind(chunk_ref.batch_id.to_string())
        // SQLite integers are signed; tag ids round-trip through the bit pattern
        .bind(chunk_ref.tag_id.map(|tag| tag.0 as i64))
        .bind(chunk_ref.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// List queued references, oldest first
    pub async fn list(&self, limit: i64) -> sqlx::Result<Vec<PushQueueRecord>> {
        sqlx::query_as::<_, PushQueueRecord>(
            r#"
            SELECT id, hash, batch_id, tag_id, created_at
            FROM chunk_push_queue
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await
    }

    /// Count queued references
    pub async fn count(&self) -> sqlx::Result<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunk_push_queue")
            .fetch_one(self.pool)
            .await?;

        Ok(result.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;
    use crate::swarm::{PostageBatchId, SwarmHash, TagId};

    #[tokio::test]
    async fn test_insert_and_list() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = PushQueueRepository::new(&pool);

        let first = UploadedChunkRef::new(
            SwarmHash::from_bytes([1u8; 32]),
            PostageBatchId::from_bytes([7u8; 32]),
            Some(TagId(u64::MAX)),
        );
        let second = UploadedChunkRef::new(
            SwarmHash::from_bytes([2u8; 32]),
            PostageBatchId::from_bytes([7u8; 32]),
            None,
        );

        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);

        let rows = repo.list(10).await.unwrap();
        assert_eq!(rows[0].hash, first.hash.to_string());
        assert_eq!(rows[0].tag_id.map(|t| t as u64), Some(u64::MAX));
        assert_eq!(rows[1].tag_id, None);
        assert_eq!(rows[1].batch_id, "07".repeat(32));
    }
}
