use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeadLetters::Table)
                    .if_not_exists()
                    .col(pk_uuid(DeadLetters::Id))
                    .col(uuid_uniq(DeadLetters::JobId))
                    .col(string(DeadLetters::JobType))
                    .col(json_binary(DeadLetters::Payload))
                    .col(integer(DeadLetters::TotalAttempts))
                    .col(timestamp_with_time_zone(DeadLetters::FirstAttemptAt))
                    .col(timestamp_with_time_zone(DeadLetters::FinalFailureAt))
                    .col(text(DeadLetters::FailureReason))
                    .col(json_binary(DeadLetters::AllErrorMessages))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dead_letters_job_id")
                            .from(DeadLetters::Table, DeadLetters::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_dead_letters_job_type")
                    .table(DeadLetters::Table)
                    .col(DeadLetters::JobType)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeadLetters::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum DeadLetters {
    Table,
    Id,
    JobId,
    JobType,
    Payload,
    TotalAttempts,
    FirstAttemptAt,
    FinalFailureAt,
    FailureReason,
    AllErrorMessages,
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
}
