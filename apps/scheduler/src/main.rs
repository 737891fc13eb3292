//! Job Scheduler - Entry Point

#[tokio::main]
async fn main() -> eyre::Result<()> {
    job_scheduler::run().await
}
