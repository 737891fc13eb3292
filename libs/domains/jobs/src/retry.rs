//! The retry controller: per-type backoff policies and the
//! retry-vs-quarantine decision on every handler failure.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::StatusCache;
use crate::error::JobResult;
use crate::handler::HandlerFailure;
use crate::models::{Job, JobStatus};
use crate::repository::{FailureOutcome, FailureRecord, JobRepository, QuarantineOutcome};
use broker::{QueueProducer, metrics};

/// Backoff parameters for one job type.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Base delay in seconds (the expected first-retry delay).
    pub base_delay_secs: u32,
    /// Hard cap on any computed delay, in seconds.
    pub max_delay_secs: u32,
    /// Default retry budget applied at submission when none is given.
    pub default_max_retries: i32,
}

impl RetryPolicy {
    pub const fn new(base_delay_secs: u32, max_delay_secs: u32, default_max_retries: i32) -> Self {
        Self {
            base_delay_secs,
            max_delay_secs,
            default_max_retries,
        }
    }

    /// Delay before re-delivering after the n-th failed attempt (1-based):
    ///
    /// ```text
    /// min(round(base · 2^(n-1) · (1 + J)), cap),  J ~ Uniform[-0.2, +0.2]
    /// ```
    ///
    /// The exponent is anchored so attempt 1 waits ≈ base seconds.
    pub fn backoff_delay(&self, attempt_number: u32) -> Duration {
        use rand::RngExt;

        let jitter: f64 = rand::rng().random_range(-0.2..=0.2);
        let exponent = attempt_number.saturating_sub(1).min(30);
        let raw = self.base_delay_secs as f64 * 2f64.powi(exponent as i32) * (1.0 + jitter);
        let capped = raw.round().clamp(0.0, self.max_delay_secs as f64);

        Duration::seconds(capped as i64)
    }
}

/// Static per-type policy table with a fallback for unregistered types.
#[derive(Debug, Clone)]
pub struct RetryPolicySet {
    policies: HashMap<String, RetryPolicy>,
    fallback: RetryPolicy,
}

impl RetryPolicySet {
    pub fn new(fallback: RetryPolicy) -> Self {
        Self {
            policies: HashMap::new(),
            fallback,
        }
    }

    pub fn with_policy(mut self, job_type: impl Into<String>, policy: RetryPolicy) -> Self {
        self.policies.insert(job_type.into(), policy);
        self
    }

    pub fn for_type(&self, job_type: &str) -> RetryPolicy {
        self.policies.get(job_type).copied().unwrap_or(self.fallback)
    }
}

impl Default for RetryPolicySet {
    /// The built-in policy table.
    fn default() -> Self {
        Self::new(RetryPolicy::new(2, 600, 3))
            .with_policy("send_email", RetryPolicy::new(2, 300, 3))
            .with_policy("process_video", RetryPolicy::new(5, 3600, 5))
            .with_policy("scrape_website", RetryPolicy::new(10, 600, 3))
    }
}

/// What the controller did with a failure.
#[derive(Debug, Clone)]
pub enum FailureDisposition {
    /// Re-delivery scheduled after the given delay
    Retried {
        attempt_number: i32,
        delay: Duration,
    },
    /// Retry budget exhausted; dead letter written
    Quarantined { total_attempts: i32 },
    /// The job was already terminal (stale message); nothing recorded
    Discarded,
}

/// Decides, on each failure, whether to re-enqueue with backoff or
/// quarantine, and records the auditable retry history.
pub struct RetryController<R: JobRepository> {
    repository: Arc<R>,
    producer: QueueProducer,
    cache: StatusCache,
    policies: RetryPolicySet,
}

impl<R: JobRepository> RetryController<R> {
    pub fn new(repository: Arc<R>, producer: QueueProducer, cache: StatusCache) -> Self {
        Self {
            repository,
            producer,
            cache,
            policies: RetryPolicySet::default(),
        }
    }

    pub fn with_policies(mut self, policies: RetryPolicySet) -> Self {
        self.policies = policies;
        self
    }

    pub fn policies(&self) -> &RetryPolicySet {
        &self.policies
    }

    /// Whether the n-th failed execution (1-based) leaves budget for a
    /// retry. The execution that equals the budget is the terminal one.
    fn retry_allowed(attempt_number: i32, max_retries: i32) -> bool {
        attempt_number < max_retries
    }

    /// Handle a failed execution of a persisted job.
    pub async fn handle_failure(
        &self,
        job_id: Uuid,
        failure: &HandlerFailure,
    ) -> JobResult<FailureDisposition> {
        let Some(job) = self.repository.find(job_id).await? else {
            warn!(job_id = %job_id, "Failure reported for unknown job; discarding");
            return Ok(FailureDisposition::Discarded);
        };

        if job.status.is_terminal() {
            info!(job_id = %job_id, status = %job.status, "Stale failure for terminal job; discarding");
            return Ok(FailureDisposition::Discarded);
        }

        let attempt_number = job.retry_count + 1;

        if Self::retry_allowed(attempt_number, job.max_retries) {
            self.schedule_retry(job, attempt_number, failure).await
        } else {
            self.quarantine(job, failure).await
        }
    }

    /// Quarantine without consuming retries: poison messages (decode
    /// failures, unregistered types) can never succeed on any peer.
    pub async fn quarantine_poison(
        &self,
        job_id: Uuid,
        reason: &str,
    ) -> JobResult<FailureDisposition> {
        let Some(job) = self.repository.find(job_id).await? else {
            warn!(job_id = %job_id, "Poison reported for unknown job; discarding");
            return Ok(FailureDisposition::Discarded);
        };

        if job.status.is_terminal() {
            return Ok(FailureDisposition::Discarded);
        }

        let failure = HandlerFailure::bad_payload(reason);
        self.quarantine(job, &failure).await
    }

    async fn schedule_retry(
        &self,
        job: Job,
        attempt_number: i32,
        failure: &HandlerFailure,
    ) -> JobResult<FailureDisposition> {
        let policy = self.policies.for_type(&job.job_type);
        let delay = policy.backoff_delay(attempt_number as u32);
        let now = Utc::now();

        let record = FailureRecord {
            message: failure.message.clone(),
            traceback: failure.traceback.clone(),
            failed_at: now,
            next_retry_at: Some(now + delay),
        };

        let outcome = self.repository.record_retry(job.id, record).await?;
        let FailureOutcome::Recorded {
            job: updated,
            attempt_number,
        } = outcome
        else {
            return Ok(FailureDisposition::Discarded);
        };

        // Cache mirror is best-effort
        if let Err(e) = self.cache.set_status(updated.id, JobStatus::Retrying).await {
            warn!(job_id = %updated.id, error = %e, "Failed to mirror retrying status");
        }

        // Publish after commit. If this fails the job sits in `retrying`
        // until the reconciler republishes it.
        let queue = updated.priority.queue();
        if let Err(e) = self
            .producer
            .publish_delayed(&updated.envelope(), queue, delay)
            .await
        {
            warn!(
                job_id = %updated.id,
                error = %e,
                "Retry committed but publish failed; reconciler will republish"
            );
        }

        metrics::record_retry(&updated.job_type, attempt_number as u32);
        info!(
            job_id = %updated.id,
            attempt = attempt_number,
            delay_secs = delay.num_seconds(),
            "Scheduled retry with backoff"
        );

        Ok(FailureDisposition::Retried {
            attempt_number,
            delay,
        })
    }

    async fn quarantine(
        &self,
        job: Job,
        failure: &HandlerFailure,
    ) -> JobResult<FailureDisposition> {
        let record = FailureRecord {
            message: failure.message.clone(),
            traceback: failure.traceback.clone(),
            failed_at: Utc::now(),
            next_retry_at: None,
        };

        let outcome = self.repository.quarantine(job.id, record).await?;
        let QuarantineOutcome::Recorded {
            dead_letter,
            attempt_number,
        } = outcome
        else {
            return Ok(FailureDisposition::Discarded);
        };

        if let Err(e) = self.cache.set_status(job.id, JobStatus::Failed).await {
            warn!(job_id = %job.id, error = %e, "Failed to mirror failed status");
        }

        metrics::record_dead_letter(&dead_letter.job_type);
        warn!(
            job_id = %job.id,
            total_attempts = dead_letter.total_attempts,
            reason = %dead_letter.failure_reason,
            "Retry budget exhausted; job quarantined"
        );

        Ok(FailureDisposition::Quarantined {
            total_attempts: attempt_number,
        })
    }
}
