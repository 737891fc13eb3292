use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::JobResult;
use crate::models::{
    DeadLetter, Job, JobFilter, JobPriority, JobStatus, RetryAttempt, ScheduledJob,
};

/// Result of a precondition-guarded state transition.
///
/// `Superseded` carries the status actually observed; the caller decides
/// whether that is a duplicate delivery to absorb or a terminal status to
/// skip.
#[derive(Debug, Clone)]
pub enum Transition {
    Applied(Job),
    Superseded { current: JobStatus },
}

/// What the retry controller asks the store to record about one failed
/// execution. The attempt number is derived inside the transaction from the
/// locked row, which is what keeps attempt numbers strictly monotonic.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub message: String,
    pub traceback: Option<String>,
    pub failed_at: DateTime<Utc>,
    /// Set on the retry path, null on quarantine
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Outcome of recording a retryable failure.
#[derive(Debug, Clone)]
pub enum FailureOutcome {
    Recorded { job: Job, attempt_number: i32 },
    /// The job reached a terminal status first (stale message)
    Stale { current: JobStatus },
}

/// Outcome of quarantining a job.
#[derive(Debug, Clone)]
pub enum QuarantineOutcome {
    Recorded {
        dead_letter: DeadLetter,
        attempt_number: i32,
    },
    Stale {
        current: JobStatus,
    },
}

/// Data access for jobs, retry attempts and dead letters.
///
/// Every transition is a read-then-update inside one transaction holding a
/// row lock on the job, so per-job ordering is total and duplicate
/// deliveries are absorbed by the preconditions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: Job) -> JobResult<Job>;

    async fn find(&self, id: Uuid) -> JobResult<Option<Job>>;

    async fn list(&self, filter: JobFilter) -> JobResult<Vec<Job>>;

    /// pending|retrying → running; sets started_at (first time) and worker_id
    async fn transition_running(&self, id: Uuid, worker_id: &str) -> JobResult<Transition>;

    /// running → completed; sets completed_at
    async fn transition_completed(&self, id: Uuid) -> JobResult<Transition>;

    /// pending|retrying|running → cancelled
    async fn transition_cancelled(&self, id: Uuid) -> JobResult<Transition>;

    /// Record a failed execution and move the job to `retrying`.
    /// Inserts the attempt row and bumps retry_count in one transaction.
    async fn record_retry(&self, id: Uuid, failure: FailureRecord) -> JobResult<FailureOutcome>;

    /// Record the terminal failed execution: attempt row, `failed` status,
    /// completed_at, and the dead-letter row, in one transaction.
    async fn quarantine(&self, id: Uuid, failure: FailureRecord) -> JobResult<QuarantineOutcome>;

    async fn retry_attempts(&self, job_id: Uuid) -> JobResult<Vec<RetryAttempt>>;

    async fn dead_letter(&self, job_id: Uuid) -> JobResult<Option<DeadLetter>>;

    /// Jobs in `retrying` whose most recent next_retry_at is older than
    /// `stale_before` (the post-commit publish likely never happened).
    async fn stuck_retrying(&self, stale_before: DateTime<Utc>, limit: u64) -> JobResult<Vec<Job>>;

    /// Jobs still `pending` created before `created_before` and due for
    /// dispatch (scheduled_for null or past).
    async fn stuck_pending(&self, created_before: DateTime<Utc>, limit: u64) -> JobResult<Vec<Job>>;

    async fn count_with_status(&self, status: JobStatus) -> JobResult<u64>;

    async fn count_with_priority(&self, priority: JobPriority) -> JobResult<u64>;

    async fn counts_by_type(&self) -> JobResult<Vec<(String, u64)>>;

    async fn dead_letter_count(&self) -> JobResult<u64>;
}

/// Data access for recurring-job templates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn create(&self, schedule: ScheduledJob) -> JobResult<ScheduledJob>;

    async fn find(&self, id: Uuid) -> JobResult<Option<ScheduledJob>>;

    async fn find_by_name(&self, name: &str) -> JobResult<Option<ScheduledJob>>;

    async fn list(&self, active_only: bool) -> JobResult<Vec<ScheduledJob>>;

    /// Active schedules with next_run_at <= now, ordered by
    /// (next_run_at, id).
    async fn due(&self, now: DateTime<Utc>, limit: u64) -> JobResult<Vec<ScheduledJob>>;

    /// Advance a schedule after one emission.
    async fn mark_fired(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> JobResult<()>;

    /// Activate or deactivate; reactivation supplies a fresh next_run_at.
    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        next_run_at: Option<DateTime<Utc>>,
    ) -> JobResult<ScheduledJob>;

    async fn delete(&self, id: Uuid) -> JobResult<bool>;
}
