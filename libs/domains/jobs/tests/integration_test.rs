//! End-to-end tests for the job lifecycle, retry controller, worker
//! runtime, scheduler and reconciler against real PostgreSQL and Redis
//! (testcontainers).

use async_trait::async_trait;
use broker::{ConsumerConfig, PayloadMap, QueueConsumer, QueueProducer};
use chrono::{Duration, Utc};
use domain_jobs::*;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use test_utils::{TestDatabase, TestRedis};

/// Handler that fails its first `fail_first` executions, then succeeds.
/// Records the `tag` payload value of every execution, in order.
struct TestHandler {
    job_type: &'static str,
    required: &'static [&'static str],
    fail_first: u32,
    calls: AtomicU32,
    log: Mutex<Vec<String>>,
}

impl TestHandler {
    fn new(job_type: &'static str) -> Arc<Self> {
        Arc::new(Self {
            job_type,
            required: &[],
            fail_first: 0,
            calls: AtomicU32::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    fn failing_first(job_type: &'static str, fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            job_type,
            required: &[],
            fail_first,
            calls: AtomicU32::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    fn with_required(job_type: &'static str, required: &'static [&'static str]) -> Arc<Self> {
        Arc::new(Self {
            job_type,
            required,
            fail_first: 0,
            calls: AtomicU32::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn executed_tags(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for TestHandler {
    fn job_type(&self) -> &'static str {
        self.job_type
    }

    fn required_keys(&self) -> &'static [&'static str] {
        self.required
    }

    async fn execute(&self, payload: &PayloadMap) -> Result<PayloadMap, HandlerFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(tag) = payload.get("tag").and_then(|v| v.as_str()) {
            self.log.lock().unwrap().push(tag.to_string());
        }

        if call < self.fail_first {
            Err(HandlerFailure::execution("boom").with_traceback("test handler raised"))
        } else {
            Ok(PayloadMap::new())
        }
    }
}

/// The full stack wired against one Postgres and one Redis container.
struct Harness {
    _db: TestDatabase,
    redis: TestRedis,
    repository: Arc<PgJobRepository>,
    schedules: Arc<PgScheduleRepository>,
    cache: StatusCache,
    producer: QueueProducer,
    lifecycle: Arc<LifecycleManager<PgJobRepository>>,
    runtime: WorkerRuntime<PgJobRepository>,
}

impl Harness {
    async fn with_handlers(handlers: Vec<Arc<TestHandler>>) -> Self {
        let db = TestDatabase::new().await;
        let redis = TestRedis::new().await;

        let repository = Arc::new(PgJobRepository::new(db.connection()));
        let schedules = Arc::new(PgScheduleRepository::new(db.connection()));
        let cache = StatusCache::new(redis.connection());
        let producer = QueueProducer::new(redis.connection());

        let mut registry = HandlerRegistry::new();
        for handler in handlers {
            registry.register(handler);
        }
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

        let consumer = QueueConsumer::new(
            redis.connection(),
            ConsumerConfig::new()
                .with_consumer_id("worker-under-test")
                .with_batch_size(10),
        );
        consumer.ensure_groups().await.unwrap();

        let runtime = WorkerRuntime::new(
            "worker-under-test",
            consumer,
            producer.clone(),
            lifecycle.clone(),
            retry,
            registry,
            cache.clone(),
        );

        Self {
            _db: db,
            redis,
            repository,
            schedules,
            cache,
            producer,
            lifecycle,
            runtime,
        }
    }

    fn submit_spec(job_type: &str, tag: &str, priority: JobPriority, max_retries: i32) -> SubmitJob {
        let mut payload = PayloadMap::new();
        payload.insert("tag".to_string(), serde_json::json!(tag));
        SubmitJob {
            job_type: job_type.to_string(),
            priority,
            payload,
            max_retries,
            scheduled_for: None,
        }
    }

    /// Release everything parked in the delayed set, regardless of delay.
    async fn promote_all(&self) {
        self.producer
            .promote_due(Utc::now() + Duration::days(1))
            .await
            .unwrap();
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_simple_success_walks_pending_running_completed() {
    let handler = TestHandler::new("send_email");
    let harness = Harness::with_handlers(vec![handler.clone()]).await;

    let id = harness
        .lifecycle
        .submit(Harness::submit_spec("send_email", "welcome-email", JobPriority::High, 3))
        .await
        .unwrap();

    // Round-trip: the row matches the submission
    let job = harness.lifecycle.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.job_type, "send_email");
    assert_eq!(job.priority, JobPriority::High);
    assert_eq!(job.max_retries, 3);
    assert!(job.started_at.is_none());

    // Cache mirror wrote pending
    let cached = harness.cache.get_status(id).await.unwrap();
    assert_eq!(cached.as_deref(), Some("pending"));

    let processed = harness.runtime.process_available().await.unwrap();
    assert_eq!(processed, 1);
    assert_eq!(handler.calls(), 1);

    let job = harness.lifecycle.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.worker_id.as_deref(), Some("worker-under-test"));

    // No failure bookkeeping, queue drained
    assert!(harness.repository.retry_attempts(id).await.unwrap().is_empty());
    assert!(harness.repository.dead_letter(id).await.unwrap().is_none());
    assert_eq!(harness.runtime.process_available().await.unwrap(), 0);
}

#[tokio::test]
async fn test_submit_rejects_unknown_type_and_bad_budget() {
    let harness = Harness::with_handlers(vec![TestHandler::new("send_email")]).await;

    let err = harness
        .lifecycle
        .submit(Harness::submit_spec("no_such_type", "x", JobPriority::Low, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Validation(_)));

    let err = harness
        .lifecycle
        .submit(Harness::submit_spec("send_email", "x", JobPriority::Low, 26))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Validation(_)));
}

#[tokio::test]
async fn test_future_scheduled_for_parks_until_released() {
    let handler = TestHandler::new("send_email");
    let harness = Harness::with_handlers(vec![handler.clone()]).await;

    let mut spec = Harness::submit_spec("send_email", "later", JobPriority::Medium, 3);
    spec.scheduled_for = Some(Utc::now() + Duration::hours(2));

    let id = harness.lifecycle.submit(spec).await.unwrap();

    // Nothing visible on the ready queues
    assert_eq!(harness.runtime.process_available().await.unwrap(), 0);
    assert_eq!(handler.calls(), 0);
    assert_eq!(harness.producer.delayed_depth().await.unwrap(), 1);

    // Time catches up
    harness.promote_all().await;
    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);

    let job = harness.lifecycle.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_cancelled_job_is_skipped_without_execution() {
    let handler = TestHandler::new("send_email");
    let harness = Harness::with_handlers(vec![handler.clone()]).await;

    let id = harness
        .lifecycle
        .submit(Harness::submit_spec("send_email", "c", JobPriority::Medium, 3))
        .await
        .unwrap();

    harness.lifecycle.mark_cancelled(id).await.unwrap();
    // Cancelling twice is idempotent
    harness.lifecycle.mark_cancelled(id).await.unwrap();

    // The queued message is discovered terminal at mark_running and ACKed
    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);
    assert_eq!(handler.calls(), 0);

    let job = harness.lifecycle.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.completed_at.is_none());
    // Terminal is absorbing: nothing further changed it
    assert_eq!(harness.runtime.process_available().await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_delivery_is_absorbed() {
    let handler = TestHandler::new("send_email");
    let harness = Harness::with_handlers(vec![handler.clone()]).await;

    let id = harness
        .lifecycle
        .submit(Harness::submit_spec("send_email", "dup", JobPriority::Medium, 3))
        .await
        .unwrap();

    // A second copy of the same envelope (at-least-once delivery)
    let job = harness.lifecycle.get(id).await.unwrap();
    harness
        .producer
        .publish(&job.envelope(), job.priority.queue())
        .await
        .unwrap();

    assert_eq!(harness.runtime.process_available().await.unwrap(), 2);

    // Exactly one successful transition to completed, one execution
    assert_eq!(handler.calls(), 1);
    let job = harness.lifecycle.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.retry_count, 0);
}

#[tokio::test]
async fn test_crash_redelivery_reruns_handler_to_completion() {
    let handler = TestHandler::new("send_email");
    let harness = Harness::with_handlers(vec![handler.clone()]).await;

    let id = harness
        .lifecycle
        .submit(Harness::submit_spec("send_email", "crash", JobPriority::High, 3))
        .await
        .unwrap();

    // The previous worker died after committing running but before ACK
    let decision = harness.lifecycle.mark_running(id, "dead-worker").await.unwrap();
    assert!(matches!(decision, RunDecision::Execute(_)));

    // Redelivery: mark_running is a no-op but the handler re-runs
    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);
    assert_eq!(handler.calls(), 1);

    let job = harness.lifecycle.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(harness.repository.retry_attempts(id).await.unwrap().is_empty());
}

// ============================================================================
// Retry controller
// ============================================================================

#[tokio::test]
async fn test_retry_then_success() {
    let handler = TestHandler::failing_first("send_email", 1);
    let harness = Harness::with_handlers(vec![handler.clone()]).await;

    let id = harness
        .lifecycle
        .submit(Harness::submit_spec("send_email", "flaky-email", JobPriority::Medium, 3))
        .await
        .unwrap();

    // Attempt 1 fails and is parked with backoff
    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);

    let job = harness.lifecycle.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Retrying);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.error_message.as_deref(), Some("boom"));

    let attempts = harness.repository.retry_attempts(id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].attempt_number, 1);
    assert_eq!(attempts[0].error_message, "boom");
    assert_eq!(attempts[0].error_traceback.as_deref(), Some("test handler raised"));

    // send_email attempt 1: round(2 · (1 ± 0.2)) = 2 seconds
    let delay = attempts[0].next_retry_at.unwrap() - attempts[0].failed_at;
    assert_eq!(delay.num_seconds(), 2);

    // Release the parked retry; attempt 2 succeeds
    harness.promote_all().await;
    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);
    assert_eq!(handler.calls(), 2);

    let job = harness.lifecycle.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.retry_count, 1);
    assert!(harness.repository.dead_letter(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_retry_exhaustion_quarantines() {
    let handler = TestHandler::failing_first("send_email", u32::MAX);
    let harness = Harness::with_handlers(vec![handler.clone()]).await;

    let id = harness
        .lifecycle
        .submit(Harness::submit_spec("send_email", "always-fails", JobPriority::Medium, 2))
        .await
        .unwrap();

    // Execution 1 fails and retries; execution 2 exhausts the budget
    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);
    harness.promote_all().await;
    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);

    let job = harness.lifecycle.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.completed_at.is_some());
    assert_eq!(job.retry_count, 2);

    let attempts = harness.repository.retry_attempts(id).await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].attempt_number, 1);
    assert_eq!(attempts[1].attempt_number, 2);
    assert!(attempts[0].next_retry_at.is_some());
    // Terminal failure has no next retry
    assert!(attempts[1].next_retry_at.is_none());

    let dead_letter = harness.repository.dead_letter(id).await.unwrap().unwrap();
    assert_eq!(dead_letter.total_attempts, 2);
    assert_eq!(dead_letter.failure_reason, "boom");
    assert_eq!(dead_letter.all_error_messages, vec!["boom", "boom"]);

    // Nothing republished after quarantine
    assert_eq!(harness.producer.delayed_depth().await.unwrap(), 0);
    assert_eq!(harness.runtime.process_available().await.unwrap(), 0);
}

#[tokio::test]
async fn test_zero_retry_budget_quarantines_on_first_failure() {
    let handler = TestHandler::failing_first("scrape_website", u32::MAX);
    let harness = Harness::with_handlers(vec![handler.clone()]).await;

    let id = harness
        .lifecycle
        .submit(Harness::submit_spec("scrape_website", "one-shot", JobPriority::Low, 0))
        .await
        .unwrap();

    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);
    assert_eq!(handler.calls(), 1);

    let job = harness.lifecycle.get(id).await.unwrap();
    // Never observed retrying; budget invariant holds
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 0);

    let dead_letter = harness.repository.dead_letter(id).await.unwrap().unwrap();
    assert_eq!(dead_letter.total_attempts, 1);
    assert_eq!(harness.repository.retry_attempts(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_bad_payload_consumes_retry_budget() {
    let handler = TestHandler::with_required("send_email", &["to", "subject", "body"]);
    let harness = Harness::with_handlers(vec![handler.clone()]).await;

    // Payload is missing every required key
    let id = harness
        .lifecycle
        .submit(Harness::submit_spec("send_email", "bad", JobPriority::Medium, 0))
        .await
        .unwrap();

    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);
    // Validation failed before execution
    assert_eq!(handler.calls(), 0);

    let job = harness.lifecycle.get(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);

    let dead_letter = harness.repository.dead_letter(id).await.unwrap().unwrap();
    assert!(dead_letter.failure_reason.contains("missing required payload keys"));
}

// ============================================================================
// Priority dispatch
// ============================================================================

#[tokio::test]
async fn test_high_priority_processed_before_backlog_of_low() {
    let handler = TestHandler::new("send_email");
    let harness = Harness::with_handlers(vec![handler.clone()]).await;

    for spec in [
        Harness::submit_spec("send_email", "low-1", JobPriority::Low, 3),
        Harness::submit_spec("send_email", "low-2", JobPriority::Low, 3),
        Harness::submit_spec("send_email", "high-1", JobPriority::High, 3),
    ] {
        harness.lifecycle.submit(spec).await.unwrap();
    }

    assert_eq!(harness.runtime.process_available().await.unwrap(), 3);

    let tags = handler.executed_tags();
    assert_eq!(tags[0], "high-1");
    assert_eq!(&tags[1..], &["low-1", "low-2"]);
}

// ============================================================================
// Poison messages
// ============================================================================

#[tokio::test]
async fn test_undecodable_message_goes_to_broker_dlq() {
    let harness = Harness::with_handlers(vec![TestHandler::new("send_email")]).await;

    let mut conn = harness.redis.connection();
    let _: String = redis::cmd("XADD")
        .arg("jobs.medium")
        .arg("*")
        .arg("job")
        .arg("{broken")
        .query_async(&mut conn)
        .await
        .unwrap();

    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);
    assert_eq!(harness.producer.dlq_depth().await.unwrap(), 1);
    // ACKed: not redelivered
    assert_eq!(harness.runtime.process_available().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unregistered_type_with_row_is_quarantined() {
    // The submitting process knew the type; this worker does not
    let harness = Harness::with_handlers(vec![TestHandler::new("send_email")]).await;

    let now = Utc::now();
    let job = Job {
        id: uuid::Uuid::now_v7(),
        job_type: "process_video".to_string(),
        priority: JobPriority::Medium,
        status: JobStatus::Pending,
        payload: PayloadMap::new(),
        max_retries: 5,
        retry_count: 0,
        created_at: now,
        started_at: None,
        completed_at: None,
        scheduled_for: None,
        worker_id: None,
        error_message: None,
    };
    let job = harness.repository.insert(job).await.unwrap();
    harness
        .producer
        .publish(&job.envelope(), job.priority.queue())
        .await
        .unwrap();

    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);

    // Quarantined directly, no retries
    let stored = harness.repository.find(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    let dead_letter = harness.repository.dead_letter(job.id).await.unwrap().unwrap();
    assert!(dead_letter.failure_reason.contains("no handler registered"));
    assert_eq!(harness.producer.dlq_depth().await.unwrap(), 1);
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test]
async fn test_scheduler_fires_once_on_catch_up() {
    let handler = TestHandler::new("send_email");
    let harness = Harness::with_handlers(vec![handler.clone()]).await;

    let scheduler = SchedulerService::new(harness.schedules.clone(), harness.producer.clone());

    let created = scheduler
        .create_schedule(CreateSchedule {
            name: "cleanup-every-five".to_string(),
            job_type: "send_email".to_string(),
            cron_expression: "*/5 * * * *".to_string(),
            payload: PayloadMap::new(),
            priority: JobPriority::Medium,
        })
        .await
        .unwrap();
    assert!(created.next_run_at > Utc::now());

    // Pretend the scheduler was down for an hour
    let overdue_since = Utc::now() - Duration::hours(1);
    harness
        .schedules
        .mark_fired(created.id, overdue_since, overdue_since)
        .await
        .unwrap();

    let now = Utc::now();
    let fired = scheduler.tick(now).await.unwrap();
    assert_eq!(fired, 1);

    // Exactly one emission despite ~12 missed ticks
    assert_eq!(harness.producer.queue_depth(broker::JobQueue::Medium).await.unwrap(), 1);

    let schedule = harness.schedules.find(created.id).await.unwrap().unwrap();
    assert!(schedule.next_run_at > now);
    assert_eq!(schedule.last_run_at.unwrap().timestamp(), now.timestamp());

    // A second tick right away fires nothing
    assert_eq!(scheduler.tick(Utc::now()).await.unwrap(), 0);

    // The synthetic emission executes without a job row
    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn test_scheduler_rejects_invalid_cron() {
    let harness = Harness::with_handlers(vec![TestHandler::new("send_email")]).await;
    let scheduler = SchedulerService::new(harness.schedules.clone(), harness.producer.clone());

    let err = scheduler
        .create_schedule(CreateSchedule {
            name: "broken".to_string(),
            job_type: "send_email".to_string(),
            cron_expression: "every five minutes".to_string(),
            payload: PayloadMap::new(),
            priority: JobPriority::Medium,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::Cron(_)));
}

#[tokio::test]
async fn test_deactivated_schedule_never_fires() {
    let harness = Harness::with_handlers(vec![TestHandler::new("send_email")]).await;
    let scheduler = SchedulerService::new(harness.schedules.clone(), harness.producer.clone());

    let created = scheduler
        .create_schedule(CreateSchedule {
            name: "paused".to_string(),
            job_type: "send_email".to_string(),
            cron_expression: "* * * * *".to_string(),
            payload: PayloadMap::new(),
            priority: JobPriority::Low,
        })
        .await
        .unwrap();

    scheduler.deactivate(created.id).await.unwrap();

    let long_past = Utc::now() - Duration::hours(1);
    harness
        .schedules
        .mark_fired(created.id, long_past, long_past)
        .await
        .unwrap();

    assert_eq!(scheduler.tick(Utc::now()).await.unwrap(), 0);
}

// ============================================================================
// Reconciler
// ============================================================================

#[tokio::test]
async fn test_reconciler_republishes_unpublished_pending_job() {
    let handler = TestHandler::new("send_email");
    let harness = Harness::with_handlers(vec![handler.clone()]).await;

    // A row committed ten minutes ago whose publish never happened
    let job = Job {
        id: uuid::Uuid::now_v7(),
        job_type: "send_email".to_string(),
        priority: JobPriority::Medium,
        status: JobStatus::Pending,
        payload: PayloadMap::new(),
        max_retries: 3,
        retry_count: 0,
        created_at: Utc::now() - Duration::minutes(10),
        started_at: None,
        completed_at: None,
        scheduled_for: None,
        worker_id: None,
        error_message: None,
    };
    let job = harness.repository.insert(job).await.unwrap();

    let reconciler = Reconciler::new(harness.repository.clone(), harness.producer.clone());
    assert_eq!(reconciler.run_once().await.unwrap(), 1);

    assert_eq!(harness.runtime.process_available().await.unwrap(), 1);
    let stored = harness.repository.find(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);

    // A second pass finds nothing
    assert_eq!(reconciler.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_reconciler_ignores_fresh_jobs() {
    let harness = Harness::with_handlers(vec![TestHandler::new("send_email")]).await;

    harness
        .lifecycle
        .submit(Harness::submit_spec("send_email", "fresh", JobPriority::Medium, 3))
        .await
        .unwrap();

    let reconciler = Reconciler::new(harness.repository.clone(), harness.producer.clone());
    assert_eq!(reconciler.run_once().await.unwrap(), 0);
}

// ============================================================================
// Stats & heartbeats
// ============================================================================

#[tokio::test]
async fn test_stats_snapshot_counts() {
    let success = TestHandler::new("send_email");
    let failing = TestHandler::failing_first("scrape_website", u32::MAX);
    let harness = Harness::with_handlers(vec![success.clone(), failing.clone()]).await;

    harness
        .lifecycle
        .submit(Harness::submit_spec("send_email", "a", JobPriority::High, 3))
        .await
        .unwrap();
    harness
        .lifecycle
        .submit(Harness::submit_spec("scrape_website", "b", JobPriority::Low, 0))
        .await
        .unwrap();

    harness.runtime.process_available().await.unwrap();

    // Advertise a live worker
    harness
        .cache
        .heartbeat(&WorkerHeartbeat {
            worker_id: "worker-under-test".to_string(),
            started_at: Utc::now(),
            beat_at: Utc::now(),
        })
        .await
        .unwrap();

    let stats = StatsAggregator::new(
        harness.repository.clone(),
        harness.producer.clone(),
        harness.cache.clone(),
    )
    .snapshot()
    .await
    .unwrap();

    assert_eq!(stats.jobs_by_status["completed"], 1);
    assert_eq!(stats.jobs_by_status["failed"], 1);
    assert_eq!(stats.jobs_by_type["send_email"], 1);
    assert_eq!(stats.jobs_by_priority["high"], 1);
    assert_eq!(stats.dead_letters, 1);
    assert!(stats.live_workers.contains(&"worker-under-test".to_string()));
}
