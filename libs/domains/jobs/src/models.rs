use broker::{JobQueue, PayloadMap};
use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;
use validator::Validate;

/// Job priority tiers, mapped one-to-one onto the broker queues
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    Default,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "job_priority")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobPriority {
    #[sea_orm(string_value = "high")]
    High,
    /// Default priority
    #[default]
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "low")]
    Low,
}

impl JobPriority {
    /// The broker queue this priority dispatches to.
    pub fn queue(&self) -> JobQueue {
        match self {
            JobPriority::High => JobQueue::High,
            JobPriority::Medium => JobQueue::Medium,
            JobPriority::Low => JobQueue::Low,
        }
    }
}

/// Job lifecycle states
///
/// `Completed`, `Failed` and `Cancelled` are absorbing: no transition ever
/// leaves them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    Default,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "job_status")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    #[default]
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "retrying")]
    Retrying,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// A job row in the metadata store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub priority: JobPriority,
    pub status: JobStatus,
    /// Opaque payload, interpreted only by the handler for `job_type`
    pub payload: PayloadMap,
    pub max_retries: i32,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// If set and in the future at submission, the job is parked until then
    pub scheduled_for: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
}

impl Job {
    /// The envelope published for this job.
    pub fn envelope(&self) -> broker::JobEnvelope {
        broker::JobEnvelope::new(self.id.to_string(), &self.job_type, self.payload.clone())
    }
}

/// DTO for submitting a new job
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitJob {
    #[validate(length(min = 1, max = 255))]
    pub job_type: String,
    #[serde(default)]
    pub priority: JobPriority,
    pub payload: PayloadMap,
    #[serde(default = "default_max_retries")]
    #[validate(range(min = 0, max = 25))]
    pub max_retries: i32,
    pub scheduled_for: Option<DateTime<Utc>>,
}

fn default_max_retries() -> i32 {
    3
}

/// Query filters for listing jobs
#[derive(Debug, Clone, Deserialize, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub priority: Option<JobPriority>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// One row per dispatch of a job that ended in failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub id: Uuid,
    pub job_id: Uuid,
    /// 1-based, strictly monotonic per job
    pub attempt_number: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub failed_at: DateTime<Utc>,
    pub error_message: String,
    pub error_traceback: Option<String>,
    /// Null on the terminal failure
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Quarantine record for a job whose retry budget is exhausted
///
/// At most one per job; exists iff the job's status is `failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_type: String,
    pub payload: PayloadMap,
    pub total_attempts: i32,
    pub first_attempt_at: DateTime<Utc>,
    pub final_failure_at: DateTime<Utc>,
    /// The last error observed
    pub failure_reason: String,
    /// Every attempt's error, in attempt order
    pub all_error_messages: Vec<String>,
}

/// A recurring-job template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub name: String,
    pub job_type: String,
    /// 5-field POSIX cron, evaluated in UTC
    pub cron_expression: String,
    pub payload: PayloadMap,
    pub priority: JobPriority,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Non-null while active
    pub next_run_at: DateTime<Utc>,
}

/// DTO for creating a recurring job
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSchedule {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub job_type: String,
    pub cron_expression: String,
    pub payload: PayloadMap,
    #[serde(default)]
    pub priority: JobPriority,
}

/// Heartbeat payload a worker writes under `worker/<id>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub beat_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Retrying).unwrap(),
            "\"retrying\""
        );
        assert_eq!(JobStatus::Pending.to_string(), "pending");
    }

    #[test]
    fn test_priority_queue_mapping() {
        assert_eq!(JobPriority::High.queue(), JobQueue::High);
        assert_eq!(JobPriority::Medium.queue(), JobQueue::Medium);
        assert_eq!(JobPriority::Low.queue(), JobQueue::Low);
        assert_eq!(JobPriority::default(), JobPriority::Medium);
    }

    #[test]
    fn test_submit_job_validation() {
        let mut payload = PayloadMap::new();
        payload.insert("to".to_string(), serde_json::json!("a@b"));

        let submit = SubmitJob {
            job_type: "send_email".to_string(),
            priority: JobPriority::High,
            payload: payload.clone(),
            max_retries: 3,
            scheduled_for: None,
        };
        assert!(submit.validate().is_ok());

        let too_many = SubmitJob {
            max_retries: 26,
            ..submit.clone()
        };
        assert!(too_many.validate().is_err());

        let empty_type = SubmitJob {
            job_type: String::new(),
            ..submit
        };
        assert!(empty_type.validate().is_err());
    }

    #[test]
    fn test_submit_job_defaults_from_json() {
        let submit: SubmitJob = serde_json::from_str(
            r#"{"job_type": "send_email", "payload": {"to": "a@b"}}"#,
        )
        .unwrap();

        assert_eq!(submit.priority, JobPriority::Medium);
        assert_eq!(submit.max_retries, 3);
        assert!(submit.scheduled_for.is_none());
    }

    #[test]
    fn test_job_filter_defaults() {
        let filter: JobFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(filter.limit, 50);
        assert_eq!(filter.offset, 0);
        assert!(filter.status.is_none());
    }
}
