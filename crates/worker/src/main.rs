use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xyplot_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xyplot_worker=debug,xyplot_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;

    // --- Database ---
    let pool = xyplot_db::create_pool(config.require_database_url()?)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    xyplot_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    xyplot_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // Interrupted rows are failed by the process that owns the queue, in
    // `SweepService::start`, never from here.
    pool.close().await;
    tracing::info!("Worker maintenance complete");
    Ok(())
}
