use crate::models::RetryAttempt;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sea-ORM entity for the retry_attempts table
///
/// Unique on (job_id, attempt_number).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "retry_attempts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub job_id: Uuid,
    pub attempt_number: i32,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub failed_at: DateTimeWithTimeZone,
    #[sea_orm(column_type = "Text")]
    pub error_message: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_traceback: Option<String>,
    pub next_retry_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for RetryAttempt {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            job_id: model.job_id,
            attempt_number: model.attempt_number,
            started_at: model.started_at.map(Into::into),
            failed_at: model.failed_at.into(),
            error_message: model.error_message,
            error_traceback: model.error_traceback,
            next_retry_at: model.next_retry_at.map(Into::into),
        }
    }
}
