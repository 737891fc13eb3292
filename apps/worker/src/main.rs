//! Job Worker - Entry Point
//!
//! Deployments register their handler set here before starting the
//! runtime; the core ships none.

use domain_jobs::HandlerRegistry;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let registry = HandlerRegistry::new();

    job_worker::run(registry).await
}
