use crate::models::{JobPriority, ScheduledJob};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sea-ORM entity for the scheduled_jobs table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "scheduled_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    pub job_type: String,
    pub cron_expression: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,
    pub priority: JobPriority,
    pub is_active: bool,
    pub last_run_at: Option<DateTimeWithTimeZone>,
    pub next_run_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for ScheduledJob {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            job_type: model.job_type,
            cron_expression: model.cron_expression,
            payload: model.payload.as_object().cloned().unwrap_or_default(),
            priority: model.priority,
            is_active: model.is_active,
            last_run_at: model.last_run_at.map(Into::into),
            next_run_at: model.next_run_at.into(),
        }
    }
}

impl From<ScheduledJob> for ActiveModel {
    fn from(schedule: ScheduledJob) -> Self {
        use sea_orm::ActiveValue::Set;

        ActiveModel {
            id: Set(schedule.id),
            name: Set(schedule.name),
            job_type: Set(schedule.job_type),
            cron_expression: Set(schedule.cron_expression),
            payload: Set(Json::Object(schedule.payload)),
            priority: Set(schedule.priority),
            is_active: Set(schedule.is_active),
            last_run_at: Set(schedule.last_run_at.map(Into::into)),
            next_run_at: Set(schedule.next_run_at.into()),
        }
    }
}
