pub use sea_orm_migration::prelude::*;

mod m20260312_000000_create_jobs;
mod m20260312_000001_create_retry_attempts;
mod m20260312_000002_create_dead_letters;
mod m20260312_000003_create_scheduled_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260312_000000_create_jobs::Migration),
            Box::new(m20260312_000001_create_retry_attempts::Migration),
            Box::new(m20260312_000002_create_dead_letters::Migration),
            Box::new(m20260312_000003_create_scheduled_jobs::Migration),
        ]
    }
}
