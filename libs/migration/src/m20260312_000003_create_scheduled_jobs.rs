use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScheduledJobs::Table)
                    .if_not_exists()
                    .col(pk_uuid(ScheduledJobs::Id))
                    .col(string_uniq(ScheduledJobs::Name))
                    .col(string(ScheduledJobs::JobType))
                    .col(string(ScheduledJobs::CronExpression))
                    .col(json_binary(ScheduledJobs::Payload))
                    .col(
                        ColumnDef::new(ScheduledJobs::Priority)
                            .enumeration(
                                JobPriority::Enum,
                                [JobPriority::High, JobPriority::Medium, JobPriority::Low],
                            )
                            .not_null()
                            .default("medium"),
                    )
                    .col(boolean(ScheduledJobs::IsActive).default(true))
                    .col(timestamp_with_time_zone_null(ScheduledJobs::LastRunAt))
                    .col(timestamp_with_time_zone(ScheduledJobs::NextRunAt))
                    .to_owned(),
            )
            .await?;

        // The scheduler's poll is a range scan over (is_active, next_run_at)
        manager
            .create_index(
                Index::create()
                    .name("idx_scheduled_jobs_active_next_run")
                    .table(ScheduledJobs::Table)
                    .col(ScheduledJobs::IsActive)
                    .col(ScheduledJobs::NextRunAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScheduledJobs::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum ScheduledJobs {
    Table,
    Id,
    Name,
    JobType,
    CronExpression,
    Payload,
    Priority,
    IsActive,
    LastRunAt,
    NextRunAt,
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
