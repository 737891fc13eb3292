use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RetryAttempts::Table)
                    .if_not_exists()
                    .col(pk_uuid(RetryAttempts::Id))
                    .col(uuid(RetryAttempts::JobId))
                    .col(integer(RetryAttempts::AttemptNumber))
                    .col(timestamp_with_time_zone_null(RetryAttempts::StartedAt))
                    .col(timestamp_with_time_zone(RetryAttempts::FailedAt))
                    .col(text(RetryAttempts::ErrorMessage))
                    .col(text_null(RetryAttempts::ErrorTraceback))
                    .col(timestamp_with_time_zone_null(RetryAttempts::NextRetryAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_retry_attempts_job_id")
                            .from(RetryAttempts::Table, RetryAttempts::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Attempt numbers are strictly monotonic per job
        manager
            .create_index(
                Index::create()
                    .name("uq_retry_attempts_job_attempt")
                    .table(RetryAttempts::Table)
                    .col(RetryAttempts::JobId)
                    .col(RetryAttempts::AttemptNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_retry_attempts_next_retry_at")
                    .table(RetryAttempts::Table)
                    .col(RetryAttempts::NextRetryAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RetryAttempts::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum RetryAttempts {
    Table,
    Id,
    JobId,
    AttemptNumber,
    StartedAt,
    FailedAt,
    ErrorMessage,
    ErrorTraceback,
    NextRetryAt,
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
}
