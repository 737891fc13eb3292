use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create job_priority enum
        manager
            .create_type(
                Type::create()
                    .as_enum(JobPriority::Enum)
                    .values([JobPriority::High, JobPriority::Medium, JobPriority::Low])
                    .to_owned(),
            )
            .await?;

        // Create job_status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(JobStatus::Enum)
                    .values([
                        JobStatus::Pending,
                        JobStatus::Running,
                        JobStatus::Retrying,
                        JobStatus::Completed,
                        JobStatus::Failed,
                        JobStatus::Cancelled,
                    ])
                    .to_owned(),
            )
            .await?;

        // Create jobs table
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(pk_uuid(Jobs::Id))
                    .col(string(Jobs::JobType))
                    .col(
                        ColumnDef::new(Jobs::Priority)
                            .enumeration(
                                JobPriority::Enum,
                                [JobPriority::High, JobPriority::Medium, JobPriority::Low],
                            )
                            .not_null()
                            .default("medium"),
                    )
                    .col(
                        ColumnDef::new(Jobs::Status)
                            .enumeration(
                                JobStatus::Enum,
                                [
                                    JobStatus::Pending,
                                    JobStatus::Running,
                                    JobStatus::Retrying,
                                    JobStatus::Completed,
                                    JobStatus::Failed,
                                    JobStatus::Cancelled,
                                ],
                            )
                            .not_null()
                            .default("pending"),
                    )
                    .col(json_binary(Jobs::Payload))
                    .col(integer(Jobs::MaxRetries).default(3))
                    .col(integer(Jobs::RetryCount).default(0))
                    .col(
                        timestamp_with_time_zone(Jobs::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Jobs::StartedAt))
                    .col(timestamp_with_time_zone_null(Jobs::CompletedAt))
                    .col(timestamp_with_time_zone_null(Jobs::ScheduledFor))
                    .col(string_null(Jobs::WorkerId))
                    .col(text_null(Jobs::ErrorMessage))
                    .to_owned(),
            )
            .await?;

        // Create indexes
        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_status")
                    .table(Jobs::Table)
                    .col(Jobs::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_job_type")
                    .table(Jobs::Table)
                    .col(Jobs::JobType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_priority")
                    .table(Jobs::Table)
                    .col(Jobs::Priority)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_created_at")
                    .table(Jobs::Table)
                    .col(Jobs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_scheduled_for")
                    .table(Jobs::Table)
                    .col(Jobs::ScheduledFor)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Jobs::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(JobStatus::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(JobPriority::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    JobType,
    Priority,
    Status,
    Payload,
    MaxRetries,
    RetryCount,
    CreatedAt,
    StartedAt,
    CompletedAt,
    ScheduledFor,
    WorkerId,
    ErrorMessage,
}

#[derive(DeriveIden)]
enum JobPriority {
    #[sea_orm(iden = "job_priority")]
    Enum,
    #[sea_orm(iden = "high")]
    High,
    #[sea_orm(iden = "medium")]
    Medium,
    #[sea_orm(iden = "low")]
    Low,
}

#[derive(DeriveIden)]
enum JobStatus {
    #[sea_orm(iden = "job_status")]
    Enum,
    #[sea_orm(iden = "pending")]
    Pending,
    #[sea_orm(iden = "running")]
    Running,
    #[sea_orm(iden = "retrying")]
    Retrying,
    #[sea_orm(iden = "completed")]
    Completed,
    #[sea_orm(iden = "failed")]
    Failed,
    #[sea_orm(iden = "cancelled")]
    Cancelled,
}
