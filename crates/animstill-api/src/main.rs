//! animstill server binary.
//!
//! Hosts the HTTP API, the render worker and the cleanup scheduler in one
//! process.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use animstill_api::{create_router, metrics, ApiConfig, AppState};
use animstill_media::{check_encoder, ensure_dir, sweep_dir};
use animstill_queue::{JobQueue, JobStore};
use animstill_worker::{CleanupScheduler, RenderWorker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting animstill");

    // Load configuration
    let config = ApiConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    ensure_dir(&config.renders_dir)
        .await
        .with_context(|| format!("creating {}", config.renders_dir.display()))?;
    ensure_dir(&config.uploads_dir)
        .await
        .with_context(|| format!("creating {}", config.uploads_dir.display()))?;

    // Job records do not outlive the process, so nothing left here is reachable
    sweep_dir(&config.uploads_dir, None)
        .await
        .with_context(|| format!("sweeping {}", config.uploads_dir.display()))?;
    sweep_dir(&config.renders_dir, Some("mp4"))
        .await
        .with_context(|| format!("sweeping {}", config.renders_dir.display()))?;

    match check_encoder(&worker_config.ffmpeg_path) {
        Ok(path) => info!(encoder = %path.display(), "Encoder found"),
        // Jobs will fail until the encoder is installed; /ready reports it
        Err(e) => warn!(error = %e, "Encoder not available"),
    }

    // Initialize metrics
    let metrics_handle = if config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                error!(error = %e, "Failed to install metrics recorder");
                None
            }
        }
    } else {
        None
    };

    // Job pipeline
    let store = Arc::new(JobStore::new());
    let (queue, receiver) = JobQueue::new();
    let (cleanup, cleanup_task) = CleanupScheduler::spawn(Arc::clone(&store), worker_config.retention);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = RenderWorker::new(worker_config.clone(), Arc::clone(&store), cleanup, shutdown_rx)
        .spawn(receiver);

    // Create router
    let state = AppState::new(config.clone(), worker_config, store, queue);
    let app = create_router(state, metrics_handle);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Router (and its queue handle) is gone; stop the worker and let the
    // scheduler drain once the worker drops its cleanup handle.
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker.await {
        error!(error = %e, "Render worker task failed");
    }
    if let Err(e) = cleanup_task.await {
        error!(error = %e, "Cleanup scheduler task failed");
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("animstill=info,tower_http=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for CTRL+C");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
