//! Background reconciler for the commit-then-publish gap.
//!
//! Two orphan shapes exist, both caused by a crash (or broker outage)
//! between the metadata-store commit and the queue publish:
//! - `retrying` jobs whose latest `next_retry_at` is long past
//! - `pending` jobs that are due for dispatch but were never published
//!
//! The reconciler republishes both. A false positive (the message was
//! actually queued) only produces a duplicate delivery, which the
//! lifecycle preconditions absorb.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::JobResult;
use crate::models::Job;
use crate::repository::JobRepository;
use broker::{QueueProducer, metrics};

/// Default age before a retrying/pending job counts as orphaned.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 120;

/// Default interval between reconciliation passes.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

const SCAN_LIMIT: u64 = 50;

pub struct Reconciler<R: JobRepository> {
    repository: Arc<R>,
    producer: QueueProducer,
    stale_after: Duration,
}

impl<R: JobRepository> Reconciler<R> {
    pub fn new(repository: Arc<R>, producer: QueueProducer) -> Self {
        Self {
            repository,
            producer,
            stale_after: Duration::seconds(DEFAULT_STALE_AFTER_SECS),
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// One reconciliation pass. Returns how many jobs were republished.
    pub async fn run_once(&self) -> JobResult<usize> {
        let threshold = Utc::now() - self.stale_after;
        let mut republished = 0;

        let stuck_retrying = self
            .repository
            .stuck_retrying(threshold, SCAN_LIMIT)
            .await?;
        republished += self.republish_all(stuck_retrying, "retrying").await;

        let stuck_pending = self.repository.stuck_pending(threshold, SCAN_LIMIT).await?;
        republished += self.republish_all(stuck_pending, "pending").await;

        if republished > 0 {
            metrics::record_reconciled(republished as u64);
            info!(count = republished, "Reconciler republished orphaned jobs");
        }

        Ok(republished)
    }

    async fn republish_all(&self, jobs: Vec<Job>, kind: &str) -> usize {
        let mut count = 0;
        for job in jobs {
            match self
                .producer
                .publish(&job.envelope(), job.priority.queue())
                .await
            {
                Ok(_) => {
                    warn!(job_id = %job.id, kind = kind, "Republished orphaned job");
                    count += 1;
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to republish orphaned job");
                }
            }
        }
        count
    }

    /// Periodic loop, shutdown-aware.
    pub async fn run(
        &self,
        interval: std::time::Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JobResult<()> {
        info!(interval_secs = interval.as_secs(), "Reconciler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_once().await {
                warn!(error = %e, "Reconciliation pass failed");
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Reconciler stopped");
        Ok(())
    }
}
