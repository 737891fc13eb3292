//! Job Worker Service
//!
//! A long-lived consumer of the priority queues. It:
//! 1. Sets up structured logging (JSON for prod, pretty for dev)
//! 2. Connects to PostgreSQL (metadata store) and Redis (broker + cache)
//!    with bounded retry
//! 3. Registers the deployment's handler set
//! 4. Heartbeats to the status cache on an independent task
//! 5. Consumes `jobs.high` → `jobs.medium` → `jobs.low` with graceful
//!    shutdown on SIGINT/SIGTERM
//!
//! ## Architecture
//!
//! ```text
//! jobs.high / jobs.medium / jobs.low
//!   ↓ (consumer group: job_workers)
//! WorkerRuntime
//!   ↓ mark_running → handler → mark_completed
//! LifecycleManager / RetryController
//!   ↓
//! PostgreSQL (jobs, retry_attempts, dead_letters)
//! ```

use axum::Router;
use broker::{ConsumerConfig, HealthState, QueueConsumer, QueueProducer, health_router, metrics};
use core_config::{Environment, FromEnv, app_info, var_parsed};
use database::postgres::PostgresConfig;
use database::redis::RedisConfig;
use domain_jobs::{
    HandlerRegistry, LifecycleManager, PgJobRepository, RetryController, StatusCache,
    WorkerRuntime,
};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Serve liveness/readiness probes, queue info and Prometheus metrics.
async fn start_health_server(health_state: HealthState, port: u16) -> Result<()> {
    let app: Router = health_router(health_state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(port = %port, "Health server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the worker with the deployment's handler set.
///
/// Concrete handlers live outside the core: a deployment binary builds a
/// `HandlerRegistry`, registers its handlers and calls this.
pub async fn run(registry: HandlerRegistry) -> Result<()> {
    let environment = Environment::detect();
    core_config::tracing::init_tracing(&environment);

    metrics::init_metrics();

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting job worker");
    info!("Environment: {:?}", environment);

    let health_port: u16 = var_parsed("JOB_WORKER_HEALTH_PORT", var_parsed("HEALTH_PORT", 8081)?)?;

    let pg_config =
        PostgresConfig::from_env().wrap_err("Failed to load PostgreSQL configuration")?;

    info!("Connecting to PostgreSQL...");
    let db = database::postgres::connect_with_retry(&pg_config)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;

    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;

    info!("Connecting to Redis...");
    let redis = database::redis::connect_with_retry(&redis_config)
        .await
        .wrap_err("Failed to connect to Redis")?;

    let worker_id = format!("worker-{}", uuid::Uuid::new_v4());
    let prefetch: usize = var_parsed("WORKER_PREFETCH", 4)?;

    let consumer_config = ConsumerConfig::new()
        .with_consumer_id(worker_id.clone())
        .with_batch_size(prefetch)
        .with_blocking(Some(1000));
    info!(
        worker_id = %worker_id,
        prefetch = %prefetch,
        handlers = ?registry.job_types(),
        "Worker configuration loaded"
    );

    let repository = Arc::new(PgJobRepository::new(db));
    let cache = StatusCache::new(redis.clone());
    let producer = QueueProducer::new(redis.clone());
    let consumer = QueueConsumer::new(redis.clone(), consumer_config);
    let registry = Arc::new(registry);

    let lifecycle = Arc::new(LifecycleManager::new(
        repository.clone(),
        cache.clone(),
        producer.clone(),
        registry.clone(),
    ));
    let retry = Arc::new(RetryController::new(
        repository.clone(),
        producer.clone(),
        cache.clone(),
    ));

    let runtime = WorkerRuntime::new(
        worker_id,
        consumer,
        producer,
        lifecycle,
        retry,
        registry,
        cache,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState::new(
        Arc::new(redis.clone()),
        app_info.name,
        app_info.version,
    );
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    runtime
        .run(shutdown_rx)
        .await
        .map_err(|e| eyre::eyre!("{}", e))?;

    info!("Job worker stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
