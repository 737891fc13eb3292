use crate::models::DeadLetter;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sea-ORM entity for the dead_letters table
///
/// At most one row per job (unique job_id).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dead_letters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub job_id: Uuid,
    pub job_type: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,
    pub total_attempts: i32,
    pub first_attempt_at: DateTimeWithTimeZone,
    pub final_failure_at: DateTimeWithTimeZone,
    #[sea_orm(column_type = "Text")]
    pub failure_reason: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub all_error_messages: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for DeadLetter {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            job_id: model.job_id,
            job_type: model.job_type,
            payload: model.payload.as_object().cloned().unwrap_or_default(),
            total_attempts: model.total_attempts,
            first_attempt_at: model.first_attempt_at.into(),
            final_failure_at: model.final_failure_at.into(),
            failure_reason: model.failure_reason,
            all_error_messages: serde_json::from_value(model.all_error_messages)
                .unwrap_or_default(),
        }
    }
}
