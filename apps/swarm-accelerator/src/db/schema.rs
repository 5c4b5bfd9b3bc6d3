//! Database schema initialization

use sqlx::SqlitePool;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Chunk fast path: payloads (span || data) served without touching the bucket
CREATE TABLE IF NOT EXISTS chunks (
    hash TEXT PRIMARY KEY,
    payload BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_created_at ON chunks(created_at);

-- Chunks accepted locally and waiting to be pushed to the origin network
CREATE TABLE IF NOT EXISTS chunk_push_queue (
    id TEXT PRIMARY KEY,
    hash TEXT NOT NULL,
    batch_id TEXT NOT NULL,
    tag_id INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunk_push_queue_created_at ON chunk_push_queue(created_at);
"#;
