//! The worker runtime: a long-lived consumer of the priority queues.
//!
//! Per message: decode the envelope, transition the job to running, invoke
//! the registered handler, then settle the outcome (completed, retry with
//! backoff, or quarantine) before acknowledging. A crash before the ACK
//! releases the entry back to the consumer group for redelivery; the
//! lifecycle preconditions absorb the duplicate.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{HEARTBEAT_INTERVAL_SECS, StatusCache};
use crate::error::{JobError, JobResult};
use crate::handler::{HandlerFailure, HandlerRegistry, JobHandler};
use crate::lifecycle::{LifecycleManager, RunDecision};
use crate::models::WorkerHeartbeat;
use crate::repository::JobRepository;
use crate::retry::{FailureDisposition, RetryController};
use broker::{
    Delivery, JobEnvelope, JobQueue, QueueConsumer, QueueProducer, Recovery,
    metrics::{self, JobOutcome},
};

/// How often the delayed-set promoter runs.
const PROMOTER_INTERVAL_MS: u64 = 1000;

/// Backoff ceiling for consecutive read errors.
const MAX_BACKOFF_SECS: u64 = 30;

pub struct WorkerRuntime<R: JobRepository> {
    worker_id: String,
    consumer: QueueConsumer,
    producer: QueueProducer,
    lifecycle: Arc<LifecycleManager<R>>,
    retry: Arc<RetryController<R>>,
    registry: Arc<HandlerRegistry>,
    cache: StatusCache,
}

impl<R: JobRepository + 'static> WorkerRuntime<R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: impl Into<String>,
        consumer: QueueConsumer,
        producer: QueueProducer,
        lifecycle: Arc<LifecycleManager<R>>,
        retry: Arc<RetryController<R>>,
        registry: Arc<HandlerRegistry>,
        cache: StatusCache,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            consumer,
            producer,
            lifecycle,
            retry,
            registry,
            cache,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run the consume loop until shutdown.
    ///
    /// Heartbeating and the delayed-set promoter run on their own tasks so
    /// a long handler never starves them. On shutdown the in-flight batch
    /// finishes before the loop exits; anything else is redelivered.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> JobResult<()> {
        info!(
            worker_id = %self.worker_id,
            handlers = ?self.registry.job_types(),
            "Starting worker runtime"
        );

        if self.registry.is_empty() {
            warn!("No handlers registered; every delivery will be rejected as poison");
        }

        self.consumer.ensure_groups().await?;

        if let Err(e) = self.consumer.claim_all_pending_on_startup().await {
            warn!(error = %e, "Failed to claim pending messages on startup");
        }

        self.spawn_heartbeat(shutdown.clone());
        self.spawn_promoter(shutdown.clone());

        let config = self.consumer.config();
        let poll_interval = Duration::from_millis(config.poll_interval_ms);
        let claim_interval = Duration::from_secs(config.claim_idle_time_secs * 2);
        let is_blocking = self.consumer.is_blocking();
        let mut last_claim = std::time::Instant::now();
        let mut consecutive_errors: u32 = 0;
        let mut shutdown = shutdown;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping worker");
                break;
            }

            match self.process_available().await {
                Ok(_) => {
                    if consecutive_errors > 0 {
                        info!("Connection recovered after {} errors", consecutive_errors);
                        consecutive_errors = 0;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;

                    let recovery = match &e {
                        JobError::Broker(broker_err) => broker_err.recovery(),
                        _ => Recovery::None,
                    };

                    match recovery {
                        Recovery::RecreateGroup => {
                            warn!("Consumer group missing, recreating...");
                            if let Err(create_err) = self.consumer.ensure_groups().await {
                                error!(error = %create_err, "Failed to recreate consumer groups");
                            }
                        }
                        Recovery::Reconnect => {
                            let backoff_secs = std::cmp::min(
                                2u64.pow(consecutive_errors.min(5)),
                                MAX_BACKOFF_SECS,
                            );
                            warn!(
                                error = %e,
                                consecutive_errors = %consecutive_errors,
                                backoff_secs = %backoff_secs,
                                "Broker connection error, backing off"
                            );
                            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        }
                        Recovery::None => {
                            error!(error = %e, "Error processing batch");
                        }
                    }

                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            }

            if last_claim.elapsed() >= claim_interval {
                if let Err(e) = self.consumer.claim_abandoned().await {
                    debug!(error = %e, "Error claiming abandoned messages");
                }
                last_claim = std::time::Instant::now();
            }

            // In blocking mode the broker read waits; in polling mode we do
            if !is_blocking {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Received shutdown signal, stopping worker");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }

        info!(worker_id = %self.worker_id, "Worker runtime stopped");
        Ok(())
    }

    /// Read one batch (pending first, then new) and process every delivery
    /// in priority order. Returns the number of deliveries handled.
    pub async fn process_available(&self) -> JobResult<usize> {
        let mut deliveries = self.consumer.read_pending().await?;
        deliveries.extend(self.consumer.read_new().await?);

        let count = deliveries.len();
        for delivery in deliveries {
            self.process_delivery(delivery).await;
        }

        Ok(count)
    }

    async fn process_delivery(&self, delivery: Delivery) {
        let queue = delivery.queue;
        let message_id = delivery.message_id;

        match delivery.envelope {
            Err(decode) => {
                // Undecodable body: no peer can process it either
                warn!(
                    stream = %queue.stream(),
                    message_id = %message_id,
                    error = %decode.reason,
                    "Poison message (undecodable envelope)"
                );
                self.reject_poison(queue, &message_id, &decode.raw, &decode.reason)
                    .await;
            }
            Ok(envelope) => match envelope.job_uuid() {
                Some(job_id) => {
                    self.process_job(queue, &message_id, job_id, &envelope).await;
                }
                None => {
                    self.process_synthetic(queue, &message_id, &envelope).await;
                }
            },
        }
    }

    /// A delivery for a persisted job row.
    async fn process_job(
        &self,
        queue: JobQueue,
        message_id: &str,
        job_id: Uuid,
        envelope: &JobEnvelope,
    ) {
        let Some(handler) = self.registry.get(&envelope.job_type) else {
            let reason = format!("no handler registered for job type '{}'", envelope.job_type);
            warn!(job_id = %job_id, job_type = %envelope.job_type, "Poison message (unregistered type)");

            if let Err(e) = self.retry.quarantine_poison(job_id, &reason).await {
                error!(job_id = %job_id, error = %e, "Failed to quarantine poison job; leaving for redelivery");
                return;
            }
            let raw = envelope.to_json().unwrap_or_default();
            self.reject_poison(queue, message_id, &raw, &reason).await;
            return;
        };

        let decision = match self.lifecycle.mark_running(job_id, &self.worker_id).await {
            Ok(decision) => decision,
            Err(JobError::NotFound(_)) => {
                // Envelope outlived its row; nothing to run anywhere
                let raw = envelope.to_json().unwrap_or_default();
                self.reject_poison(queue, message_id, &raw, "job row does not exist")
                    .await;
                return;
            }
            Err(e) => {
                // Transient store failure: leave unACKed for redelivery
                error!(job_id = %job_id, error = %e, "mark_running failed; leaving message for redelivery");
                return;
            }
        };

        let job = match decision {
            RunDecision::Execute(job) => job,
            RunDecision::Skip { current } => {
                debug!(job_id = %job_id, status = %current, "Skipping settled job");
                metrics::record_job_processed(queue.stream(), JobOutcome::Skipped);
                self.ack(queue, message_id).await;
                return;
            }
        };

        debug!(
            job_id = %job_id,
            job_type = %job.job_type,
            attempt = job.retry_count + 1,
            "Executing handler"
        );

        let start = std::time::Instant::now();
        let result = Self::invoke(handler.as_ref(), envelope).await;
        metrics::record_job_duration(queue.stream(), start.elapsed());

        match result {
            Ok(_) => {
                match self.lifecycle.mark_completed(job_id).await {
                    Ok(()) => {
                        metrics::record_job_processed(queue.stream(), JobOutcome::Completed);
                        self.ack(queue, message_id).await;
                    }
                    Err(e) => {
                        // Commit is not durable: keep the message so the
                        // redelivery observes the true state
                        error!(job_id = %job_id, error = %e, "mark_completed failed; leaving message for redelivery");
                    }
                }
            }
            Err(failure) => match self.retry.handle_failure(job_id, &failure).await {
                Ok(disposition) => {
                    let outcome = match disposition {
                        FailureDisposition::Retried { .. } => JobOutcome::Retried,
                        FailureDisposition::Quarantined { .. } => JobOutcome::Quarantined,
                        FailureDisposition::Discarded => JobOutcome::Skipped,
                    };
                    metrics::record_job_processed(queue.stream(), outcome);
                    // The republished retry, if any, is a new message
                    self.ack(queue, message_id).await;
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Retry controller failed; leaving message for redelivery");
                }
            },
        }
    }

    /// A scheduled emission with no job row: execute without lifecycle
    /// bookkeeping; failures go to the broker DLQ.
    async fn process_synthetic(&self, queue: JobQueue, message_id: &str, envelope: &JobEnvelope) {
        let Some(handler) = self.registry.get(&envelope.job_type) else {
            let raw = envelope.to_json().unwrap_or_default();
            let reason = format!("no handler registered for job type '{}'", envelope.job_type);
            self.reject_poison(queue, message_id, &raw, &reason).await;
            return;
        };

        debug!(job_id = %envelope.job_id, job_type = %envelope.job_type, "Executing scheduled emission");

        match Self::invoke(handler.as_ref(), envelope).await {
            Ok(_) => {
                metrics::record_job_processed(queue.stream(), JobOutcome::Completed);
                self.ack(queue, message_id).await;
            }
            Err(failure) => {
                warn!(
                    job_id = %envelope.job_id,
                    error = %failure,
                    "Scheduled emission failed; no retry bookkeeping without a job row"
                );
                let raw = envelope.to_json().unwrap_or_default();
                self.reject_poison(queue, message_id, &raw, &failure.message)
                    .await;
            }
        }
    }

    async fn invoke(
        handler: &dyn JobHandler,
        envelope: &JobEnvelope,
    ) -> Result<broker::PayloadMap, HandlerFailure> {
        handler.validate(&envelope.payload)?;
        handler.execute(&envelope.payload).await
    }

    async fn reject_poison(&self, queue: JobQueue, message_id: &str, raw: &str, reason: &str) {
        metrics::record_job_processed(queue.stream(), JobOutcome::Poison);
        if let Err(e) = self
            .consumer
            .reject_to_dlq(queue, message_id, raw, reason)
            .await
        {
            error!(message_id = %message_id, error = %e, "Failed to copy poison message to DLQ");
        }
        self.ack(queue, message_id).await;
    }

    async fn ack(&self, queue: JobQueue, message_id: &str) {
        if let Err(e) = self.consumer.ack(queue, message_id).await {
            error!(message_id = %message_id, error = %e, "Failed to ACK message");
        }
    }

    /// Heartbeat task: refreshes `worker/<id>` every 20 s on its own timer,
    /// independent of handler execution.
    fn spawn_heartbeat(&self, mut shutdown: watch::Receiver<bool>) {
        let cache = self.cache.clone();
        let worker_id = self.worker_id.clone();
        let started_at = Utc::now();

        tokio::spawn(async move {
            let interval = Duration::from_secs(HEARTBEAT_INTERVAL_SECS);

            loop {
                let beat = WorkerHeartbeat {
                    worker_id: worker_id.clone(),
                    started_at,
                    beat_at: Utc::now(),
                };
                if let Err(e) = cache.heartbeat(&beat).await {
                    warn!(worker_id = %worker_id, error = %e, "Heartbeat write failed");
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

            debug!(worker_id = %worker_id, "Heartbeat task stopped");
        });
    }

    /// Promoter task: releases due entries from the delayed set into their
    /// target streams.
    fn spawn_promoter(&self, mut shutdown: watch::Receiver<bool>) {
        let producer = self.producer.clone();

        tokio::spawn(async move {
            let interval = Duration::from_millis(PROMOTER_INTERVAL_MS);

            loop {
                match producer.promote_due(Utc::now()).await {
                    Ok(promoted) if promoted > 0 => {
                        metrics::record_delayed_promotions(promoted as u64);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "Delayed-set promotion failed");
                    }
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

            debug!("Promoter task stopped");
        });
    }
}
