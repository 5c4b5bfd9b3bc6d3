//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::net::TcpListener;

use swarm_accelerator::config::Config;
use swarm_accelerator::db::create_pool;
use swarm_accelerator::queue::SqlitePushQueue;
use swarm_accelerator::state::AppState;
use swarm_accelerator::storage::LocalBucket;
use swarm_accelerator::store::ChunkStore;
use swarm_accelerator::swarm::{SwarmChunk, SwarmHash, BRANCHES, CHUNK_SIZE};

pub const BATCH: &str = "0102030405060708091011121314151617181920212223242526272829303132";

pub const ORIGIN_BODY: &str = "from-origin";

/// A request as seen by the fake origin
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Fake Bee node that records every request it receives
pub struct FakeOrigin {
    pub url: String,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeOrigin {
    pub async fn spawn() -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .fallback(record)
            .with_state(requests.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}/", addr),
            requests,
        }
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record(State(requests): State<Arc<Mutex<Vec<Recorded>>>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap();
    let teapot = parts.uri.path() == "/teapot";

    requests.lock().unwrap().push(Recorded {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
    });

    if teapot {
        return (StatusCode::IM_A_TEAPOT, [("x-origin", "1")], "short and stout").into_response();
    }
    (StatusCode::OK, [("x-origin", "1")], ORIGIN_BODY).into_response()
}

/// Origin URL nothing is listening on
pub async fn unreachable_origin() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub pool: SqlitePool,
    _bucket_dir: TempDir,
}

impl TestApp {
    pub async fn new(origin_url: &str) -> Self {
        Self::with_config(origin_url, |_| {}).await
    }

    pub async fn with_config(origin_url: &str, configure: impl FnOnce(&mut Config)) -> Self {
        let bucket_dir = TempDir::new().unwrap();
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let store = ChunkStore::new(pool.clone(), Arc::new(LocalBucket::new(bucket_dir.path())), true);

        let mut config = Config::default();
        config.origin.url = origin_url.to_string();
        config.origin.timeout_secs = 5;
        configure(&mut config);

        let state = AppState::new(config, store, Arc::new(SqlitePushQueue::new(pool.clone()))).unwrap();
        let router = swarm_accelerator::router(state.clone());

        Self {
            state,
            router,
            pool,
            _bucket_dir: bucket_dir,
        }
    }

    /// Serve the router on an ephemeral port
    pub async fn serve(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    pub fn store(&self) -> &ChunkStore {
        self.state.store()
    }
}

pub async fn body_bytes(response: Response) -> Bytes {
    to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

pub fn empty() -> Body {
    Body::empty()
}

/// Split content into a chunk tree, store it, and return the root hash
pub async fn store_content(store: &ChunkStore, content: &[u8]) -> SwarmHash {
    let mut level: Vec<(SwarmHash, u64)> = Vec::new();
    for piece in content.chunks(CHUNK_SIZE) {
        let chunk = SwarmChunk::new(piece.len() as u64, piece).unwrap();
        store.put(&chunk).await.unwrap();
        level.push((chunk.hash(), piece.len() as u64));
    }
    if level.is_empty() {
        let chunk = SwarmChunk::new(0, &[]).unwrap();
        store.put(&chunk).await.unwrap();
        return chunk.hash();
    }

    while level.len() > 1 {
        let mut next = Vec::new();
        for group in level.chunks(BRANCHES) {
            let span = group.iter().map(|(_, span)| span).sum();
            let refs: Vec<u8> = group.iter().flat_map(|(hash, _)| *hash.as_bytes()).collect();
            let chunk = SwarmChunk::new(span, &refs).unwrap();
            store.put(&chunk).await.unwrap();
            next.push((chunk.hash(), span));
        }
        level = next;
    }
    level[0].0
}
