//! PostgreSQL implementations of the repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, ExprTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::{dead_letter, job, retry_attempt, scheduled_job};
use crate::error::{JobError, JobResult};
use crate::models::{
    DeadLetter, Job, JobFilter, JobPriority, JobStatus, RetryAttempt, ScheduledJob,
};
use crate::repository::{
    FailureOutcome, FailureRecord, JobRepository, QuarantineOutcome, ScheduleRepository,
    Transition,
};

pub struct PgJobRepository {
    db: DatabaseConnection,
}

impl PgJobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Load a job inside a transaction, holding its row lock.
    async fn lock_job(
        txn: &DatabaseTransaction,
        id: Uuid,
    ) -> JobResult<Option<job::Model>> {
        Ok(job::Entity::find_by_id(id)
            .lock_exclusive()
            .one(txn)
            .await?)
    }

    async fn insert_attempt(
        txn: &DatabaseTransaction,
        job_id: Uuid,
        attempt_number: i32,
        started_at: Option<DateTime<Utc>>,
        failure: &FailureRecord,
    ) -> JobResult<retry_attempt::Model> {
        let attempt = retry_attempt::ActiveModel {
            id: Set(Uuid::now_v7()),
            job_id: Set(job_id),
            attempt_number: Set(attempt_number),
            started_at: Set(started_at.map(Into::into)),
            failed_at: Set(failure.failed_at.into()),
            error_message: Set(failure.message.clone()),
            error_traceback: Set(failure.traceback.clone()),
            next_retry_at: Set(failure.next_retry_at.map(Into::into)),
        };

        Ok(sea_orm::ActiveModelTrait::insert(attempt, txn).await?)
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, new_job: Job) -> JobResult<Job> {
        let active: job::ActiveModel = new_job.into();
        let model = job::Entity::insert(active)
            .exec_with_returning(&self.db)
            .await?;

        tracing::debug!(job_id = %model.id, job_type = %model.job_type, "Inserted job row");
        Ok(model.into())
    }

    async fn find(&self, id: Uuid) -> JobResult<Option<Job>> {
        let model = job::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn list(&self, filter: JobFilter) -> JobResult<Vec<Job>> {
        let mut query = job::Entity::find();

        if let Some(status) = filter.status {
            query = query.filter(job::Column::Status.eq(status));
        }
        if let Some(job_type) = filter.job_type {
            query = query.filter(job::Column::JobType.eq(job_type));
        }
        if let Some(priority) = filter.priority {
            query = query.filter(job::Column::Priority.eq(priority));
        }

        let models = query
            .order_by_desc(job::Column::CreatedAt)
            .limit(filter.limit as u64)
            .offset(filter.offset as u64)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn transition_running(&self, id: Uuid, worker_id: &str) -> JobResult<Transition> {
        let txn = self.db.begin().await?;

        let Some(model) = Self::lock_job(&txn, id).await? else {
            txn.rollback().await?;
            return Err(JobError::NotFound(id));
        };

        match model.status {
            JobStatus::Pending | JobStatus::Retrying => {
                let started_at = model.started_at;
                let mut active = model.into_active_model();
                active.status = Set(JobStatus::Running);
                if started_at.is_none() {
                    active.started_at = Set(Some(Utc::now().into()));
                }
                active.worker_id = Set(Some(worker_id.to_string()));

                let updated = sea_orm::ActiveModelTrait::update(active, &txn).await?;
                txn.commit().await?;
                Ok(Transition::Applied(updated.into()))
            }
            current => {
                txn.commit().await?;
                Ok(Transition::Superseded { current })
            }
        }
    }

    async fn transition_completed(&self, id: Uuid) -> JobResult<Transition> {
        let txn = self.db.begin().await?;

        let Some(model) = Self::lock_job(&txn, id).await? else {
            txn.rollback().await?;
            return Err(JobError::NotFound(id));
        };

        match model.status {
            JobStatus::Running => {
                let mut active = model.into_active_model();
                active.status = Set(JobStatus::Completed);
                active.completed_at = Set(Some(Utc::now().into()));

                let updated = sea_orm::ActiveModelTrait::update(active, &txn).await?;
                txn.commit().await?;
                Ok(Transition::Applied(updated.into()))
            }
            current => {
                txn.commit().await?;
                Ok(Transition::Superseded { current })
            }
        }
    }

    async fn transition_cancelled(&self, id: Uuid) -> JobResult<Transition> {
        let txn = self.db.begin().await?;

        let Some(model) = Self::lock_job(&txn, id).await? else {
            txn.rollback().await?;
            return Err(JobError::NotFound(id));
        };

        match model.status {
            JobStatus::Pending | JobStatus::Retrying | JobStatus::Running => {
                let mut active = model.into_active_model();
                active.status = Set(JobStatus::Cancelled);

                let updated = sea_orm::ActiveModelTrait::update(active, &txn).await?;
                txn.commit().await?;
                Ok(Transition::Applied(updated.into()))
            }
            current => {
                txn.commit().await?;
                Ok(Transition::Superseded { current })
            }
        }
    }

    async fn record_retry(&self, id: Uuid, failure: FailureRecord) -> JobResult<FailureOutcome> {
        let txn = self.db.begin().await?;

        let Some(model) = Self::lock_job(&txn, id).await? else {
            txn.rollback().await?;
            return Err(JobError::NotFound(id));
        };

        if model.status.is_terminal() {
            txn.commit().await?;
            return Ok(FailureOutcome::Stale {
                current: model.status,
            });
        }

        let attempt_number = model.retry_count + 1;
        let started_at = model.started_at.map(Into::into);

        Self::insert_attempt(&txn, id, attempt_number, started_at, &failure).await?;

        let mut active = model.into_active_model();
        active.status = Set(JobStatus::Retrying);
        active.retry_count = Set(attempt_number);
        active.error_message = Set(Some(failure.message.clone()));

        let updated = sea_orm::ActiveModelTrait::update(active, &txn).await?;
        txn.commit().await?;

        Ok(FailureOutcome::Recorded {
            job: updated.into(),
            attempt_number,
        })
    }

    async fn quarantine(&self, id: Uuid, failure: FailureRecord) -> JobResult<QuarantineOutcome> {
        let txn = self.db.begin().await?;

        let Some(model) = Self::lock_job(&txn, id).await? else {
            txn.rollback().await?;
            return Err(JobError::NotFound(id));
        };

        if model.status.is_terminal() {
            txn.commit().await?;
            return Ok(QuarantineOutcome::Stale {
                current: model.status,
            });
        }

        let attempt_number = model.retry_count + 1;
        let started_at = model.started_at.map(Into::into);

        Self::insert_attempt(&txn, id, attempt_number, started_at, &failure).await?;

        // All attempts for the job, including the one just inserted
        let attempts = retry_attempt::Entity::find()
            .filter(retry_attempt::Column::JobId.eq(id))
            .order_by_asc(retry_attempt::Column::AttemptNumber)
            .all(&txn)
            .await?;

        let first_attempt_at: DateTime<Utc> = attempts
            .first()
            .map(|a| {
                a.started_at
                    .map(Into::into)
                    .unwrap_or_else(|| a.failed_at.into())
            })
            .unwrap_or(failure.failed_at);
        let all_errors: Vec<String> = attempts.iter().map(|a| a.error_message.clone()).collect();

        let job_type = model.job_type.clone();
        let payload = model.payload.clone();
        let max_retries = model.max_retries;

        let mut active = model.into_active_model();
        active.status = Set(JobStatus::Failed);
        active.completed_at = Set(Some(failure.failed_at.into()));
        // Clamped so retry_count never exceeds the budget (max_retries = 0
        // quarantines on the first execution)
        active.retry_count = Set(Ord::min(attempt_number, max_retries));
        active.error_message = Set(Some(failure.message.clone()));
        sea_orm::ActiveModelTrait::update(active, &txn).await?;

        let dead_letter = dead_letter::ActiveModel {
            id: Set(Uuid::now_v7()),
            job_id: Set(id),
            job_type: Set(job_type),
            payload: Set(payload),
            total_attempts: Set(attempt_number),
            first_attempt_at: Set(first_attempt_at.into()),
            final_failure_at: Set(failure.failed_at.into()),
            failure_reason: Set(failure.message.clone()),
            all_error_messages: Set(serde_json::json!(all_errors)),
        };
        let dead_letter = sea_orm::ActiveModelTrait::insert(dead_letter, &txn).await?;

        txn.commit().await?;

        Ok(QuarantineOutcome::Recorded {
            dead_letter: dead_letter.into(),
            attempt_number,
        })
    }

    async fn retry_attempts(&self, job_id: Uuid) -> JobResult<Vec<RetryAttempt>> {
        let models = retry_attempt::Entity::find()
            .filter(retry_attempt::Column::JobId.eq(job_id))
            .order_by_asc(retry_attempt::Column::AttemptNumber)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn dead_letter(&self, job_id: Uuid) -> JobResult<Option<DeadLetter>> {
        let model = dead_letter::Entity::find()
            .filter(dead_letter::Column::JobId.eq(job_id))
            .one(&self.db)
            .await?;

        Ok(model.map(Into::into))
    }

    async fn stuck_retrying(&self, stale_before: DateTime<Utc>, limit: u64) -> JobResult<Vec<Job>> {
        let retrying = job::Entity::find()
            .filter(job::Column::Status.eq(JobStatus::Retrying))
            .order_by_asc(job::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?;

        // The release instant lives on the latest attempt row; jobs whose
        // latest next_retry_at is long past were committed but never
        // republished (the post-commit publish crash gap).
        let mut stuck = Vec::new();
        for model in retrying {
            let latest = retry_attempt::Entity::find()
                .filter(retry_attempt::Column::JobId.eq(model.id))
                .order_by_desc(retry_attempt::Column::AttemptNumber)
                .one(&self.db)
                .await?;

            let stale = match latest.and_then(|a| a.next_retry_at) {
                Some(next_retry_at) => {
                    let next_retry_at: DateTime<Utc> = next_retry_at.into();
                    next_retry_at < stale_before
                }
                // Retrying with no attempt row should not happen; recover it
                None => true,
            };

            if stale {
                stuck.push(model.into());
            }
        }

        Ok(stuck)
    }

    async fn stuck_pending(&self, created_before: DateTime<Utc>, limit: u64) -> JobResult<Vec<Job>> {
        let now: DateTime<Utc> = Utc::now();

        let models = job::Entity::find()
            .filter(job::Column::Status.eq(JobStatus::Pending))
            .filter(job::Column::CreatedAt.lt(created_before))
            .filter(
                job::Column::ScheduledFor
                    .is_null()
                    .or(job::Column::ScheduledFor.lte(now)),
            )
            .order_by_asc(job::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn count_with_status(&self, status: JobStatus) -> JobResult<u64> {
        let count = job::Entity::find()
            .filter(job::Column::Status.eq(status))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn count_with_priority(&self, priority: JobPriority) -> JobResult<u64> {
        let count = job::Entity::find()
            .filter(job::Column::Priority.eq(priority))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn counts_by_type(&self) -> JobResult<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> = job::Entity::find()
            .select_only()
            .column(job::Column::JobType)
            .column_as(job::Column::Id.count(), "count")
            .group_by(job::Column::JobType)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(job_type, count)| (job_type, count as u64))
            .collect())
    }

    async fn dead_letter_count(&self) -> JobResult<u64> {
        let count = dead_letter::Entity::find().count(&self.db).await?;
        Ok(count)
    }
}

pub struct PgScheduleRepository {
    db: DatabaseConnection,
}

impl PgScheduleRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ScheduleRepository for PgScheduleRepository {
    async fn create(&self, schedule: ScheduledJob) -> JobResult<ScheduledJob> {
        let active: scheduled_job::ActiveModel = schedule.into();
        let model = scheduled_job::Entity::insert(active)
            .exec_with_returning(&self.db)
            .await?;

        tracing::info!(schedule_id = %model.id, name = %model.name, "Created schedule");
        Ok(model.into())
    }

    async fn find(&self, id: Uuid) -> JobResult<Option<ScheduledJob>> {
        let model = scheduled_job::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn find_by_name(&self, name: &str) -> JobResult<Option<ScheduledJob>> {
        let model = scheduled_job::Entity::find()
            .filter(scheduled_job::Column::Name.eq(name))
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    async fn list(&self, active_only: bool) -> JobResult<Vec<ScheduledJob>> {
        let mut query = scheduled_job::Entity::find();
        if active_only {
            query = query.filter(scheduled_job::Column::IsActive.eq(true));
        }

        let models = query
            .order_by_asc(scheduled_job::Column::Name)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn due(&self, now: DateTime<Utc>, limit: u64) -> JobResult<Vec<ScheduledJob>> {
        let models = scheduled_job::Entity::find()
            .filter(scheduled_job::Column::IsActive.eq(true))
            .filter(scheduled_job::Column::NextRunAt.lte(now))
            .order_by_asc(scheduled_job::Column::NextRunAt)
            .order_by_asc(scheduled_job::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn mark_fired(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> JobResult<()> {
        let Some(model) = scheduled_job::Entity::find_by_id(id).one(&self.db).await? else {
            return Err(JobError::NotFound(id));
        };

        let mut active = model.into_active_model();
        active.last_run_at = Set(Some(last_run_at.into()));
        active.next_run_at = Set(next_run_at.into());
        sea_orm::ActiveModelTrait::update(active, &self.db).await?;

        Ok(())
    }

    async fn set_active(
        &self,
        id: Uuid,
        active: bool,
        next_run_at: Option<DateTime<Utc>>,
    ) -> JobResult<ScheduledJob> {
        let Some(model) = scheduled_job::Entity::find_by_id(id).one(&self.db).await? else {
            return Err(JobError::NotFound(id));
        };

        let mut active_model = model.into_active_model();
        active_model.is_active = Set(active);
        if let Some(next_run_at) = next_run_at {
            active_model.next_run_at = Set(next_run_at.into());
        }

        let updated = sea_orm::ActiveModelTrait::update(active_model, &self.db).await?;
        Ok(updated.into())
    }

    async fn delete(&self, id: Uuid) -> JobResult<bool> {
        let result = scheduled_job::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }
}
