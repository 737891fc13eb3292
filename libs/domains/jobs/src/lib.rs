//! Jobs Domain
//!
//! The core of the distributed job queue: the job state machine, the retry
//! controller, the worker runtime, the recurring-job scheduler and the
//! statistics aggregator, over PostgreSQL (source of truth), Redis Streams
//! (dispatch) and Redis TTL keys (status mirror + heartbeats).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   submit / transitions   ┌──────────────────┐
//! │ LifecycleManager │─────────────────────────▶│  JobRepository   │
//! └────────┬─────────┘                          │   (PostgreSQL)   │
//!          │ publish                            └────────▲─────────┘
//!          ▼                                             │ record/quarantine
//! ┌──────────────────┐   deliveries   ┌───────────────┐  │
//! │  broker streams  │───────────────▶│ WorkerRuntime │──┤
//! └────────▲─────────┘                └───────┬───────┘  │
//!          │ delayed re-publish               ▼          │
//!          └───────────────────────── RetryController ───┘
//!
//! SchedulerService polls scheduled_jobs and publishes due emissions.
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let repository = Arc::new(PgJobRepository::new(db));
//! let cache = StatusCache::new(redis.clone());
//! let producer = QueueProducer::new(redis.clone());
//!
//! let lifecycle = LifecycleManager::new(repository.clone(), cache.clone(), producer.clone(), registry.clone());
//! let job_id = lifecycle.submit(submit).await?;
//! ```

pub mod cache;
pub mod cron;
pub mod entity;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod models;
pub mod postgres;
pub mod reconciler;
pub mod repository;
pub mod retry;
pub mod scheduler;
pub mod stats;
pub mod worker;

// Re-export commonly used types
pub use cache::StatusCache;
pub use cron::CronExpr;
pub use error::{JobError, JobResult};
pub use handler::{FailureKind, HandlerFailure, HandlerRegistry, JobHandler};
pub use lifecycle::{LifecycleManager, RunDecision};
pub use models::{
    CreateSchedule, DeadLetter, Job, JobFilter, JobPriority, JobStatus, RetryAttempt,
    ScheduledJob, SubmitJob, WorkerHeartbeat,
};
pub use postgres::{PgJobRepository, PgScheduleRepository};
pub use reconciler::Reconciler;
pub use repository::{
    FailureOutcome, FailureRecord, JobRepository, QuarantineOutcome, ScheduleRepository,
    Transition,
};
pub use retry::{FailureDisposition, RetryController, RetryPolicy, RetryPolicySet};
pub use scheduler::SchedulerService;
pub use stats::{QueueStats, StatsAggregator};
pub use worker::WorkerRuntime;
