//! Chunk cache
//!
//! Local content-addressed chunk storage that reads are served from and
//! uploads are accepted into.

pub mod chunk_store;

pub use chunk_store::{ChunkSource, ChunkStore, StoreError};
