//! Job Scheduler Service
//!
//! Single-instance process hosting three periodic loops:
//! - The recurring-job scheduler: materialises due `scheduled_jobs` rows
//!   into queue messages once per tick
//! - The reconciler: republishes jobs stranded by the commit-then-publish
//!   crash gap
//! - The delayed-set promoter: releases due entries from `jobs.delayed`
//!
//! Run exactly one instance; multi-instance deployments need lease-based
//! coordination this binary does not implement.

use axum::Router;
use broker::{HealthState, QueueProducer, health_router, metrics};
use chrono::Utc;
use core_config::{Environment, FromEnv, app_info, var_parsed};
use database::postgres::PostgresConfig;
use database::redis::RedisConfig;
use domain_jobs::{PgJobRepository, PgScheduleRepository, Reconciler, SchedulerService};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// How often the delayed-set promoter runs here.
const PROMOTER_INTERVAL_MS: u64 = 1000;

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

pub async fn run() -> Result<()> {
    let environment = Environment::detect();
    core_config::tracing::init_tracing(&environment);

    metrics::init_metrics();

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting job scheduler");
    info!("Environment: {:?}", environment);

    let health_port: u16 =
        var_parsed("JOB_SCHEDULER_HEALTH_PORT", var_parsed("HEALTH_PORT", 8082)?)?;

    let poll_interval_secs: u64 = var_parsed("SCHEDULER_POLL_INTERVAL_SECS", 60)?;

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

    let producer = QueueProducer::new(redis.clone());
    let schedules = Arc::new(PgScheduleRepository::new(db.clone()));
    let jobs = Arc::new(PgJobRepository::new(db));

    let scheduler = SchedulerService::new(schedules, producer.clone());
    let reconciler = Reconciler::new(jobs, producer.clone());

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

    // Reconciler on its own timer
    let reconciler_shutdown = shutdown_rx.clone();
    let reconciler_handle = tokio::spawn(async move {
        let interval = Duration::from_secs(domain_jobs::reconciler::DEFAULT_INTERVAL_SECS);
        if let Err(e) = reconciler.run(interval, reconciler_shutdown).await {
            error!(error = %e, "Reconciler failed");
        }
    });

    // Delayed-set promoter on its own timer
    let promoter_producer = producer.clone();
    let mut promoter_shutdown = shutdown_rx.clone();
    let promoter_handle = tokio::spawn(async move {
        let interval = Duration::from_millis(PROMOTER_INTERVAL_MS);
        loop {
            match promoter_producer.promote_due(Utc::now()).await {
                Ok(promoted) if promoted > 0 => {
                    metrics::record_delayed_promotions(promoted as u64);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Delayed-set promotion failed");
                }
            }

            tokio::select! {
                _ = promoter_shutdown.changed() => {
                    if *promoter_shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    });

    scheduler
        .run(Duration::from_secs(poll_interval_secs), shutdown_rx)
        .await
        .map_err(|e| eyre::eyre!("{}", e))?;

    let _ = tokio::join!(reconciler_handle, promoter_handle);

    info!("Job scheduler stopped");
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
