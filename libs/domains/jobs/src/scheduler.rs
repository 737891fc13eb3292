//! The recurring-job scheduler: materialises due schedules into queue
//! messages on each poll tick.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::cron::CronExpr;
use crate::error::{JobError, JobResult};
use crate::models::{CreateSchedule, ScheduledJob};
use crate::repository::ScheduleRepository;
use broker::{JobEnvelope, QueueProducer, metrics};

/// Default poll interval between scheduler ticks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Schedules processed per tick; anything left over is picked up next tick.
const DUE_BATCH: u64 = 100;

/// Single-instance polling scheduler.
///
/// Each tick fires at most one emission per overdue schedule (catch-up
/// after downtime trades missed ticks for bounded burst behaviour) and
/// advances `next_run_at` strictly past now.
pub struct SchedulerService<S: ScheduleRepository> {
    repository: Arc<S>,
    producer: QueueProducer,
}

impl<S: ScheduleRepository> SchedulerService<S> {
    pub fn new(repository: Arc<S>, producer: QueueProducer) -> Self {
        Self {
            repository,
            producer,
        }
    }

    /// Create a schedule with `next_run_at` seeded from now; never null
    /// while active.
    pub async fn create_schedule(&self, input: CreateSchedule) -> JobResult<ScheduledJob> {
        input
            .validate()
            .map_err(|e| JobError::Validation(e.to_string()))?;

        let cron = CronExpr::parse(&input.cron_expression)?;
        let now = Utc::now();

        let schedule = ScheduledJob {
            id: Uuid::now_v7(),
            name: input.name,
            job_type: input.job_type,
            cron_expression: cron.expression().to_string(),
            payload: input.payload,
            priority: input.priority,
            is_active: true,
            last_run_at: None,
            next_run_at: cron.next_after(now)?,
        };

        self.repository.create(schedule).await
    }

    /// Reactivate a schedule, reseeding `next_run_at` from now.
    pub async fn activate(&self, id: Uuid) -> JobResult<ScheduledJob> {
        let schedule = self
            .repository
            .find(id)
            .await?
            .ok_or(JobError::NotFound(id))?;

        let next = CronExpr::parse(&schedule.cron_expression)?.next_after(Utc::now())?;
        self.repository.set_active(id, true, Some(next)).await
    }

    pub async fn deactivate(&self, id: Uuid) -> JobResult<ScheduledJob> {
        self.repository.set_active(id, false, None).await
    }

    /// One poll tick: publish every due schedule once and advance it.
    /// Returns the number of emissions.
    #[instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> JobResult<usize> {
        let due = self.repository.due(now, DUE_BATCH).await?;
        let mut fired = 0;

        for schedule in due {
            match self.fire(&schedule, now).await {
                Ok(()) => fired += 1,
                Err(e) => {
                    // next_run_at stays in the past, so the next tick
                    // refires this schedule (at-least-once)
                    error!(
                        schedule_id = %schedule.id,
                        name = %schedule.name,
                        error = %e,
                        "Failed to fire schedule; will retry next tick"
                    );
                }
            }
        }

        if fired > 0 {
            info!(count = fired, "Scheduler tick fired jobs");
        }

        Ok(fired)
    }

    async fn fire(&self, schedule: &ScheduledJob, now: DateTime<Utc>) -> JobResult<()> {
        let envelope = JobEnvelope::scheduled(
            schedule.id,
            now,
            &schedule.job_type,
            schedule.payload.clone(),
        );

        self.producer
            .publish(&envelope, schedule.priority.queue())
            .await?;

        // Advance strictly past now: overdue ticks collapse into the one
        // emission above
        let next = CronExpr::parse(&schedule.cron_expression)?.next_after(now)?;
        self.repository.mark_fired(schedule.id, now, next).await?;

        metrics::record_scheduled_fire();
        info!(
            schedule_id = %schedule.id,
            name = %schedule.name,
            job_id = %envelope.job_id,
            next_run_at = %next,
            "Fired scheduled job"
        );

        Ok(())
    }

    /// The poll loop. Sleeps `poll_interval` between ticks and wakes early
    /// on shutdown.
    pub async fn run(
        &self,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JobResult<()> {
        info!(poll_interval_secs = poll_interval.as_secs(), "Scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.tick(Utc::now()).await {
                warn!(error = %e, "Scheduler tick failed");
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }
}

