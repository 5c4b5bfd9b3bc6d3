//! Chunk record database operations

use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::swarm::SwarmHash;

/// Inline chunk record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChunkRecord {
    pub hash: String,
    pub payload: Vec<u8>,
    pub created_at: String,
}

/// Chunk record repository
pub struct ChunkRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChunkRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a chunk record by hash
    pub async fn get(&self, hash: &SwarmHash) -> sqlx::Result<Option<ChunkRecord>> {
        sqlx::query_as::<_, ChunkRecord>(
            r#"
            SELECT hash, payload, created_at
            FROM chunks
            WHERE hash = ?
            "#,
        )
        .bind(hash.to_string())
        .fetch_optional(self.pool)
        .await
    }

    /// Insert a chunk record; an existing record for the hash is kept
    ///
    /// Returns whether a new row was written.
    pub async fn insert(&self, hash: &SwarmHash, payload: &[u8]) -> sqlx::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO chunks (hash, payload, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(hash.to_string())
        .bind(payload)
        .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count stored records
    pub async fn count(&self) -> sqlx::Result<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks")
            .fetch_one(self.pool)
            .await?;

        Ok(result.0)
    }
}
