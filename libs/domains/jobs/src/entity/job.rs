use crate::models::{Job, JobPriority, JobStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sea-ORM entity for the jobs table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub job_type: String,
    pub priority: JobPriority,
    pub status: JobStatus,
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,
    pub max_retries: i32,
    pub retry_count: i32,
    pub created_at: DateTimeWithTimeZone,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub completed_at: Option<DateTimeWithTimeZone>,
    pub scheduled_for: Option<DateTimeWithTimeZone>,
    pub worker_id: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Job {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            job_type: model.job_type,
            priority: model.priority,
            status: model.status,
            payload: model.payload.as_object().cloned().unwrap_or_default(),
            max_retries: model.max_retries,
            retry_count: model.retry_count,
            created_at: model.created_at.into(),
            started_at: model.started_at.map(Into::into),
            completed_at: model.completed_at.map(Into::into),
            scheduled_for: model.scheduled_for.map(Into::into),
            worker_id: model.worker_id,
            error_message: model.error_message,
        }
    }
}

impl From<Job> for ActiveModel {
    fn from(job: Job) -> Self {
        use sea_orm::ActiveValue::Set;

        ActiveModel {
            id: Set(job.id),
            job_type: Set(job.job_type),
            priority: Set(job.priority),
            status: Set(job.status),
            payload: Set(Json::Object(job.payload)),
            max_retries: Set(job.max_retries),
            retry_count: Set(job.retry_count),
            created_at: Set(job.created_at.into()),
            started_at: Set(job.started_at.map(Into::into)),
            completed_at: Set(job.completed_at.map(Into::into)),
            scheduled_for: Set(job.scheduled_for.map(Into::into)),
            worker_id: Set(job.worker_id),
            error_message: Set(job.error_message),
        }
    }
}
