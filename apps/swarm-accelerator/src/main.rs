//! Swarm Accelerator Server
//!
//! Caching chunk gateway that sits in front of a Bee node, serving chunk and
//! manifest reads locally and accepting uploads over HTTP and WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swarm_accelerator::config::{BucketConfig, Config};
use swarm_accelerator::queue::{BackgroundPushQueue, SqlitePushQueue};
use swarm_accelerator::state::AppState;
use swarm_accelerator::storage::{BlobBucket, LocalBucket, S3Client};
use swarm_accelerator::store::ChunkStore;
use swarm_accelerator::{db, router};

/// How long the push queue drainer may take to flush after shutdown
const QUEUE_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swarm_accelerator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Swarm Accelerator v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Origin node: {}", config.origin.url);

    // Initialize bucket
    let bucket: Arc<dyn BlobBucket> = match &config.storage.bucket {
        BucketConfig::Local { path } => {
            tracing::info!("Local bucket at {}", path.display());
            Arc::new(LocalBucket::new(path.clone()))
        }
        BucketConfig::S3(s3) => {
            tracing::info!("S3 endpoint: {}", s3.endpoint);
            tracing::info!("S3 bucket: {}", s3.bucket);
            Arc::new(S3Client::new(s3).await.context("Failed to initialize S3 client")?)
        }
    };

    // Initialize database
    let db_pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    let store = ChunkStore::new(db_pool.clone(), bucket, config.storage.inline_records);

    let (queue, queue_task) = BackgroundPushQueue::spawn(
        SqlitePushQueue::new(db_pool),
        config.stream.push_queue_capacity,
    );

    // Create application state
    let app_state = AppState::new(config.clone(), store, Arc::new(queue))
        .context("Failed to create application state")?;

    let app = router(app_state);

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.server.host, config.server.port))?;
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!("Swarm Accelerator listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // The router (and with it every queue sender) is gone; let the drainer
    // persist whatever is still buffered
    if tokio::time::timeout(QUEUE_FLUSH_TIMEOUT, queue_task).await.is_err() {
        tracing::warn!("Push queue did not drain before shutdown timeout");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
