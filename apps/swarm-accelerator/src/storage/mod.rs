//! Blob bucket backends
//!
//! Chunk payloads are kept in a key/value bucket keyed by hex hash. Supports
//! S3-compatible services (MinIO, R2, B2, AWS) and a local directory.

mod local;
mod s3_client;
mod types;

pub use local::LocalBucket;
pub use s3_client::S3Client;
pub use types::*;
