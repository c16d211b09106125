//! Monolith Binary - single-host deployment.
//!
//! Wires up:
//! - Backends: Redis when `REDIS_URL` is set, in-memory otherwise
//! - Filesystem content store and the ffmpeg encoder
//! - Transcoding workers and the status event listener
//! - The HTTP API

use crooner::adapters::local::events::{hub::EventHub, listener};
use crooner::adapters::local::{router, AppState, FsStore, TokenAuthenticator};
use crooner::adapters::memory::{InMemoryCatalog, InMemoryJobQueue, InMemoryStatusTracker};
use crooner::application::cleanup::CleanupService;
use crooner::application::delivery::DeliveryService;
use crooner::application::ingest::IngestionService;
use crooner::application::worker::{spawn_workers, WorkerService, WorkerSettings};
use crooner::config::Config;
use crooner::domain::encoder::cmd::RealTranscodeExecutor;
use crooner::domain::encoder::FfmpegEncoder;
use crooner::ports::catalog::VideoCatalog;
use crooner::ports::queue::JobQueuePort;
use crooner::ports::repository::StatusTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const POLL_TIMEOUT: Duration = Duration::from_secs(2);

struct Backends {
    catalog: Arc<dyn VideoCatalog>,
    tracker: Arc<dyn StatusTracker>,
    queue: Arc<dyn JobQueuePort>,
}

#[cfg(feature = "redis")]
fn redis_backends(config: &Config) -> Option<Backends> {
    use crooner::adapters::local::RedisPool;

    let url = config.redis_url.as_deref()?;
    match RedisPool::new(url, config.visibility_timeout) {
        Ok(pool) => {
            let pool = Arc::new(pool);
            tracing::info!("using Redis backends");
            Some(Backends {
                catalog: pool.clone(),
                tracker: pool.clone(),
                queue: pool,
            })
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to create Redis pool");
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "redis"))]
fn redis_backends(config: &Config) -> Option<Backends> {
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL is set but Redis support is not compiled in");
    }
    None
}

fn backends(config: &Config) -> Backends {
    redis_backends(config).unwrap_or_else(|| {
        tracing::info!("using in-memory backends, state is lost on restart");
        Backends {
            catalog: Arc::new(InMemoryCatalog::new()),
            tracker: Arc::new(InMemoryStatusTracker::new()),
            queue: Arc::new(InMemoryJobQueue::new(config.visibility_timeout)),
        }
    })
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
    shutdown.cancel();
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    for dir in [config.sources_dir(), config.thumbnails_dir()] {
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::error!(path = %dir.display(), error = %e, "failed to create media directory");
            std::process::exit(1);
        }
    }

    // 1. Adapters
    let Backends {
        catalog,
        tracker,
        queue,
    } = backends(&config);
    let store = Arc::new(FsStore::new(&config.media_root));
    let encoder = Arc::new(FfmpegEncoder::new(
        config.ffmpeg_bin.clone(),
        RealTranscodeExecutor::new(config.encode_timeout),
    ));
    let ladder = Arc::new(config.ladder.clone());

    if config.api_tokens.is_empty() {
        tracing::warn!("API_TOKENS is empty, every streaming request will be rejected");
    }
    if config.admin_tokens.is_empty() {
        tracing::warn!("ADMIN_TOKENS is empty, every admin request will be rejected");
    }
    let viewer_auth = Arc::new(TokenAuthenticator::new(config.api_tokens.iter()));
    let admin_auth = Arc::new(TokenAuthenticator::new(config.admin_tokens.iter()));

    // 2. Event system
    let event_hub = Arc::new(EventHub::new());
    let listener_handle = listener::start(event_hub.clone());

    // 3. Application services
    let ingest = Arc::new(IngestionService::new(
        catalog.clone(),
        tracker.clone(),
        queue.clone(),
        event_hub.clone(),
        ladder.clone(),
    ));
    let worker = Arc::new(WorkerService::new(
        queue.clone(),
        tracker.clone(),
        store.clone(),
        encoder,
        event_hub.clone(),
        ladder.clone(),
        WorkerSettings {
            retry: config.retry.clone(),
            poll_timeout: POLL_TIMEOUT,
            heartbeat_interval: config.visibility_timeout / 3,
        },
    ));
    let delivery = Arc::new(DeliveryService::new(
        viewer_auth,
        catalog.clone(),
        tracker.clone(),
        store.clone(),
        ladder,
    ));
    let cleanup = Arc::new(CleanupService::new(catalog, tracker, queue, store));

    // 4. Workers
    let shutdown = CancellationToken::new();
    let workers = spawn_workers(worker, config.workers, shutdown.clone());
    tracing::info!(workers = config.workers, "started transcoding workers");

    // 5. HTTP layer
    let app = router(AppState {
        delivery,
        ingest,
        cleanup,
        admin_auth,
        sources_dir: config.sources_dir(),
        thumbnails_dir: config.thumbnails_dir(),
    });

    let bind = format!("{}:{}", config.addr, config.port);
    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %bind, error = %e, "failed to bind TCP listener");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %bind, "listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
    {
        tracing::error!(error = %e, "server error");
    }

    // Workers finish their current pass; unacked jobs come back after the lease expires.
    shutdown.cancel();
    futures::future::join_all(workers).await;
    listener_handle.abort();
}
