//! The lifecycle manager: the state machine a job walks from submission to
//! a terminal status.
//!
//! Write order on submission is metadata store → status cache (best effort)
//! → broker. The store is the source of truth; a failed cache write is
//! logged and swallowed, and a failed publish leaves the row in `pending`
//! for the reconciler to republish.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::cache::StatusCache;
use crate::error::{JobError, JobResult};
use crate::handler::HandlerRegistry;
use crate::models::{Job, JobStatus, SubmitJob};
use crate::repository::{JobRepository, Transition};
use broker::QueueProducer;

/// What the worker should do with a delivery after `mark_running`.
#[derive(Debug, Clone)]
pub enum RunDecision {
    /// Run the handler (fresh transition, or a crash-redelivery of a job
    /// already marked running).
    Execute(Job),
    /// Terminal status observed: ACK without executing.
    Skip { current: JobStatus },
}

pub struct LifecycleManager<R: JobRepository> {
    repository: Arc<R>,
    cache: StatusCache,
    producer: QueueProducer,
    registry: Arc<HandlerRegistry>,
}

impl<R: JobRepository> LifecycleManager<R> {
    pub fn new(
        repository: Arc<R>,
        cache: StatusCache,
        producer: QueueProducer,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            repository,
            cache,
            producer,
            registry,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Submit a new job. Returns its id; the caller may poll the row
    /// immediately.
    #[instrument(skip(self, submit), fields(job_type = %submit.job_type))]
    pub async fn submit(&self, submit: SubmitJob) -> JobResult<Uuid> {
        submit
            .validate()
            .map_err(|e| JobError::Validation(e.to_string()))?;

        if !self.registry.contains(&submit.job_type) {
            return Err(JobError::Validation(format!(
                "unknown job type: {}",
                submit.job_type
            )));
        }

        let now = Utc::now();
        let job = Job {
            id: Uuid::now_v7(),
            job_type: submit.job_type,
            priority: submit.priority,
            status: JobStatus::Pending,
            payload: submit.payload,
            max_retries: submit.max_retries,
            retry_count: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
            scheduled_for: submit.scheduled_for,
            worker_id: None,
            error_message: None,
        };

        // 1. Durable row first; an error here surfaces and no id exists.
        let job = self.repository.insert(job).await?;

        // 2. Cache mirror is best-effort.
        if let Err(e) = self.cache.set_status(job.id, JobStatus::Pending).await {
            warn!(job_id = %job.id, error = %e, "Failed to mirror pending status");
        }

        // 3. Publish, or park until scheduled_for.
        let queue = job.priority.queue();
        let publish_result = match job.scheduled_for {
            Some(scheduled_for) if scheduled_for > now => {
                self.producer
                    .publish_at(&job.envelope(), queue, scheduled_for)
                    .await
                    .map(|_| ())
            }
            _ => self.producer.publish(&job.envelope(), queue).await.map(|_| ()),
        };

        if let Err(e) = publish_result {
            // The row is committed; the reconciler republishes stuck
            // pending jobs, so the id is still returned to the caller.
            warn!(job_id = %job.id, error = %e, "Job persisted but publish failed");
        }

        info!(job_id = %job.id, queue = %queue, "Job submitted");
        Ok(job.id)
    }

    pub async fn get(&self, id: Uuid) -> JobResult<Job> {
        self.repository
            .find(id)
            .await?
            .ok_or(JobError::NotFound(id))
    }

    /// pending|retrying → running. Duplicate deliveries of a job already
    /// running fall through to `Execute` so a crash-redelivery re-runs the
    /// handler; terminal statuses are skipped.
    #[instrument(skip(self), fields(job_id = %id, worker_id = %worker_id))]
    pub async fn mark_running(&self, id: Uuid, worker_id: &str) -> JobResult<RunDecision> {
        match self.repository.transition_running(id, worker_id).await? {
            Transition::Applied(job) => {
                if let Err(e) = self.cache.set_status(id, JobStatus::Running).await {
                    warn!(job_id = %id, error = %e, "Failed to mirror running status");
                }
                Ok(RunDecision::Execute(job))
            }
            Transition::Superseded { current } if current == JobStatus::Running => {
                warn!(job_id = %id, "Job already running (crash redelivery); re-running handler");
                let job = self.get(id).await?;
                Ok(RunDecision::Execute(job))
            }
            Transition::Superseded { current } => {
                warn!(job_id = %id, status = %current, "Stale delivery for settled job; skipping");
                Ok(RunDecision::Skip { current })
            }
        }
    }

    /// running → completed. No-op on any other status.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn mark_completed(&self, id: Uuid) -> JobResult<()> {
        match self.repository.transition_completed(id).await? {
            Transition::Applied(_) => {
                if let Err(e) = self.cache.set_status(id, JobStatus::Completed).await {
                    warn!(job_id = %id, error = %e, "Failed to mirror completed status");
                }
                info!(job_id = %id, "Job completed");
            }
            Transition::Superseded { current } => {
                warn!(job_id = %id, status = %current, "mark_completed out of order; ignoring");
            }
        }
        Ok(())
    }

    /// pending|retrying|running → cancelled. Idempotent from the caller's
    /// perspective; a worker that later receives the message observes the
    /// terminal status in `mark_running` and skips execution.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn mark_cancelled(&self, id: Uuid) -> JobResult<()> {
        match self.repository.transition_cancelled(id).await? {
            Transition::Applied(_) => {
                if let Err(e) = self.cache.set_status(id, JobStatus::Cancelled).await {
                    warn!(job_id = %id, error = %e, "Failed to mirror cancelled status");
                }
                info!(job_id = %id, "Job cancelled");
            }
            Transition::Superseded { current } if current == JobStatus::Cancelled => {
                // Already cancelled; nothing to do
            }
            Transition::Superseded { current } => {
                warn!(job_id = %id, status = %current, "Cannot cancel settled job; ignoring");
            }
        }
        Ok(())
    }
}
