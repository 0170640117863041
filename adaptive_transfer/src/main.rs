// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Adaptive Transfer Service Binary
//!
//! Command-line entry point:
//!
//! ```bash
//! # serve the HTTP API
//! atransfer serve --config transfer.toml
//!
//! # overrides for the common knobs
//! atransfer serve --bind 0.0.0.0:8080 --database sqlite://./transfer.db --workers 8
//!
//! # one synchronous maintenance pass, then exit
//! atransfer cleanup --config transfer.toml
//! ```
//!
//! The binary is the composition root: it loads configuration, initializes
//! logging, wires the stores, storage backend, queue, limiters, worker
//! pool, autoscaler and maintenance loop, and serves HTTP until a shutdown
//! signal drains the process.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use adaptive_transfer::application::services::{
    DownloadService, MaintenanceService, UploadService, UploadServiceConfig,
};
use adaptive_transfer::infrastructure::config::{QueueBackendKind, ServiceConfig};
use adaptive_transfer::infrastructure::metrics::MetricsService;
use adaptive_transfer::infrastructure::queue::build_queue;
use adaptive_transfer::infrastructure::repositories::{schema, SqliteIdempotencyStore, SqliteUploadStore};
use adaptive_transfer::infrastructure::runtime::{
    AdmissionController, Autoscaler, ChunkExecutor, CompletionRegistry, RateLimiter, WorkerPool,
};
use adaptive_transfer::infrastructure::storage::build_storage;
use adaptive_transfer::presentation::http::{build_router, serve, AppState, Authenticator};
use adaptive_transfer_bootstrap::{logger, signals, ExitCode, ShutdownCoordinator};
use adaptive_transfer_domain::{DurableQueue, IdempotencyStore, StorageBackend, TransferError, UploadStore};

#[derive(Parser)]
#[command(name = "atransfer", about = "Resumable chunked file transfer service", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service.
    Serve {
        /// Listen address override.
        #[arg(long)]
        bind: Option<String>,
        /// Database URL override.
        #[arg(long)]
        database: Option<String>,
        /// Local storage root override.
        #[arg(long)]
        storage_root: Option<String>,
        /// Initial worker count override.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Run one maintenance pass and exit.
    Cleanup,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let mut config = match ServiceConfig::load(cli.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::Config.into();
        }
    };

    if let Err(e) = logger::init(&config.logging.level) {
        eprintln!("logging error: {}", e);
        return ExitCode::Config.into();
    }

    let code = match cli.command {
        Commands::Serve {
            bind,
            database,
            storage_root,
            workers,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(database) = database {
                config.database.url = database;
            }
            if let Some(root) = storage_root {
                config.storage.root = root;
            }
            if let Some(workers) = workers {
                config.workers.count = workers;
            }
            match run_serve(config).await {
                Ok(code) => code,
                Err(e) => {
                    error!(error = %e, "service failed");
                    ExitCode::Unavailable
                }
            }
        }
        Commands::Cleanup => match run_cleanup(config).await {
            Ok(()) => ExitCode::Success,
            Err(e) => {
                error!(error = %e, "cleanup failed");
                ExitCode::Unavailable
            }
        },
    };

    code.into()
}

struct Components {
    store: Arc<dyn UploadStore>,
    storage: Arc<dyn StorageBackend>,
    queue: Arc<dyn DurableQueue>,
    metrics: Arc<MetricsService>,
    admission: Arc<AdmissionController>,
    registry: Arc<CompletionRegistry>,
    uploads: Arc<UploadService>,
    maintenance: Arc<MaintenanceService>,
}

/// Wires the shared component graph from configuration.
async fn build_components(config: &ServiceConfig) -> Result<Components, TransferError> {
    config.validate()?;

    let pool = schema::initialize_database(&config.database.url).await?;
    let store: Arc<dyn UploadStore> = Arc::new(SqliteUploadStore::new(pool.clone()));
    let idempotency: Arc<dyn IdempotencyStore> = Arc::new(SqliteIdempotencyStore::new(pool));
    let storage = build_storage(&config.storage).await?;
    let queue = build_queue(&config.queue, config.limits.task_queue_maxsize).await?;
    let metrics = Arc::new(MetricsService::new()?);

    let admission = AdmissionController::new(
        config.limits.task_queue_maxsize,
        config.limits.max_global_inflight_chunks,
        config.limits.max_inflight_chunks_per_upload,
        config.effective_fair_share(config.workers.count),
    );
    let registry = Arc::new(CompletionRegistry::new());

    // Durable mode stages chunk bodies to disk; direct mode keeps them in
    // memory.
    let staging_dir = match config.queue.backend {
        QueueBackendKind::Redis => Some(PathBuf::from(&config.queue.staging_dir)),
        QueueBackendKind::Memory => None,
    };

    let uploads = Arc::new(UploadService::new(
        Arc::clone(&store),
        Arc::clone(&idempotency),
        Arc::clone(&storage),
        Arc::clone(&queue),
        Arc::clone(&admission),
        Arc::clone(&registry),
        Arc::clone(&metrics),
        UploadServiceConfig {
            default_chunk_size: config.upload.default_chunk_size,
            max_chunk_size: config.upload.max_chunk_size,
            idempotency_ttl_seconds: config.cleanup.idempotency_ttl_seconds,
            queue_put_timeout: Duration::from_secs(config.limits.queue_put_timeout_seconds),
            task_wait_timeout: Duration::from_secs(config.limits.queue_task_timeout_seconds),
            staging_dir,
        },
    ));

    let maintenance = Arc::new(MaintenanceService::new(
        Arc::clone(&store),
        Arc::clone(&idempotency),
        Arc::clone(&storage),
        Arc::clone(&uploads),
        Arc::clone(&metrics),
        config.cleanup.clone(),
        config.upload.stale_upload_ttl_seconds,
    ));

    Ok(Components {
        store,
        storage,
        queue,
        metrics,
        admission,
        registry,
        uploads,
        maintenance,
    })
}

async fn run_serve(config: ServiceConfig) -> anyhow::Result<ExitCode> {
    let components = build_components(&config).await?;

    // Exporter wiring lives outside the service; the toggle is surfaced so
    // operators can see what the deployment expects.
    if config.tracing.enabled {
        info!(endpoint = %config.tracing.endpoint, "tracing enabled; exporter wiring is external");
    }

    let coordinator = Arc::new(ShutdownCoordinator::default());
    signals::install(Arc::clone(&coordinator));

    let executor = Arc::new(ChunkExecutor::new(
        Arc::clone(&components.store),
        Arc::clone(&components.storage),
        Arc::clone(&components.metrics),
        config.upload.max_retries,
    ));

    let initial_workers = if config.autoscale.enabled {
        config
            .workers
            .count
            .clamp(config.autoscale.min_workers, config.autoscale.max_workers)
    } else {
        config.workers.count
    };
    let worker_pool = WorkerPool::new(
        Arc::clone(&components.queue),
        executor,
        Arc::clone(&components.registry),
        Arc::clone(&components.admission),
        Arc::clone(&components.metrics),
        Arc::clone(&coordinator),
        initial_workers,
        config.limits.max_fair_inflight_chunks_per_upload == 0,
    );
    worker_pool.start();

    if config.autoscale.enabled {
        let autoscaler = Autoscaler::new(
            config.autoscale.clone(),
            Arc::clone(&worker_pool),
            Arc::clone(&components.queue),
            Arc::clone(&components.metrics),
        );
        let token = coordinator.token();
        tokio::spawn(async move { autoscaler.run(token).await });
    }

    if config.cleanup.enabled {
        let maintenance = Arc::clone(&components.maintenance);
        let token = coordinator.token();
        tokio::spawn(async move { maintenance.run(token).await });
    }

    let state = AppState {
        uploads: Arc::clone(&components.uploads),
        downloads: Arc::new(DownloadService::new(
            Arc::clone(&components.store),
            Arc::clone(&components.storage),
            Arc::clone(&components.metrics),
        )),
        maintenance: Arc::clone(&components.maintenance),
        metrics: Arc::clone(&components.metrics),
        authenticator: Arc::new(Authenticator::new(&config.auth)?),
        rate_limiter: Arc::new(RateLimiter::new(config.auth.rate_per_minute)),
        max_chunk_size: config.upload.max_chunk_size,
    };

    let router = build_router(state);
    serve(&config.server.bind, router, coordinator.token()).await?;

    // The server is down; give the worker pool its grace period to finish
    // in-flight tasks.
    coordinator.initiate();
    let clean = coordinator.drained().await;
    info!(clean, "shutdown complete");
    Ok(if clean { ExitCode::Success } else { ExitCode::Error })
}

async fn run_cleanup(config: ServiceConfig) -> anyhow::Result<()> {
    let components = build_components(&config).await?;
    let report = components.maintenance.run_once().await?;
    info!(
        stale_uploads = report.stale_uploads_aborted,
        idempotency = report.idempotency_records_removed,
        orphans = report.orphan_blobs_removed,
        "cleanup finished"
    );
    println!(
        "cleanup: {} stale uploads aborted, {} idempotency records removed, {} orphan blobs removed",
        report.stale_uploads_aborted, report.idempotency_records_removed, report.orphan_blobs_removed
    );
    Ok(())
}
