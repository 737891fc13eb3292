//! Prometheus metrics for the queue system.
//!
//! ## Available metrics
//!
//! - `jobqueue_jobs_processed_total{queue,outcome}` - jobs by processing outcome
//! - `jobqueue_job_duration_seconds{queue}` - handler execution time
//! - `jobqueue_queue_depth{queue}` - current stream length
//! - `jobqueue_retries_total{job_type}` - retry attempts scheduled
//! - `jobqueue_dead_letters_total{job_type}` - quarantined jobs
//! - `jobqueue_scheduled_fires_total` - recurring-schedule emissions
//! - `jobqueue_delayed_promotions_total` - entries released from the delayed set
//! - `jobqueue_reconciled_total` - orphaned jobs republished

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency
pub mod names {
    pub const JOBS_PROCESSED: &str = "jobqueue_jobs_processed_total";
    pub const JOB_DURATION: &str = "jobqueue_job_duration_seconds";
    pub const QUEUE_DEPTH: &str = "jobqueue_queue_depth";
    pub const RETRIES: &str = "jobqueue_retries_total";
    pub const DEAD_LETTERS: &str = "jobqueue_dead_letters_total";
    pub const SCHEDULED_FIRES: &str = "jobqueue_scheduled_fires_total";
    pub const DELAYED_PROMOTIONS: &str = "jobqueue_delayed_promotions_total";
    pub const RECONCILED: &str = "jobqueue_reconciled_total";
}

/// Processing outcome for metrics labeling
#[derive(Debug, Clone, Copy)]
pub enum JobOutcome {
    Completed,
    Retried,
    Quarantined,
    Skipped,
    Poison,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Retried => "retried",
            Self::Quarantined => "quarantined",
            Self::Skipped => "skipped",
            Self::Poison => "poison",
        }
    }
}

/// Install the Prometheus recorder. Call once at startup.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("Failed to install Prometheus recorder")
        })
        .clone()
}

/// The global handle, if `init_metrics` has run.
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

pub fn record_job_processed(queue: &str, outcome: JobOutcome) {
    counter!(
        names::JOBS_PROCESSED,
        "queue" => queue.to_string(),
        "outcome" => outcome.as_str().to_string()
    )
    .increment(1);
}

pub fn record_job_duration(queue: &str, duration: Duration) {
    histogram!(
        names::JOB_DURATION,
        "queue" => queue.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn set_queue_depth(queue: &str, depth: f64) {
    gauge!(
        names::QUEUE_DEPTH,
        "queue" => queue.to_string()
    )
    .set(depth);
}

pub fn record_retry(job_type: &str, attempt: u32) {
    counter!(
        names::RETRIES,
        "job_type" => job_type.to_string(),
        "attempt" => attempt.to_string()
    )
    .increment(1);
}

pub fn record_dead_letter(job_type: &str) {
    counter!(
        names::DEAD_LETTERS,
        "job_type" => job_type.to_string()
    )
    .increment(1);
}

pub fn record_scheduled_fire() {
    counter!(names::SCHEDULED_FIRES).increment(1);
}

pub fn record_delayed_promotions(count: u64) {
    counter!(names::DELAYED_PROMOTIONS).increment(count);
}

pub fn record_reconciled(count: u64) {
    counter!(names::RECONCILED).increment(count);
}
