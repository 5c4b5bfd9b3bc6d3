//! Swarm Accelerator Library
//!
//! A caching proxy in front of a Swarm Bee node. Chunk reads and manifest
//! reads are answered from a local chunk store when possible; uploads are
//! verified and stored locally, then queued for propagation. Everything
//! else is forwarded to the node unchanged.
//!
//! # Modules
//!
//! - `swarm`: chunk hashing and identifier types
//! - `protocol`: upload frame decoding
//! - `store`: two-tier chunk store
//! - `manifest`: manifest resolution and content joining
//! - `gateway`: local-first read policy with origin fallback
//! - `proxy`: origin forwarding client
//! - `upload` / `queue`: upload pipeline and propagation outbox

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod manifest;
pub mod protocol;
pub mod proxy;
pub mod queue;
pub mod routes;
pub mod state;
pub mod storage;
pub mod store;
pub mod swarm;
pub mod upload;

pub use routes::router;
pub use state::AppState;
