use anyhow::Context;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

/// Builds the shared PostgreSQL connection pool
pub async fn connect_sqlx(db_url: &str) -> Result<PgPool, anyhow::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(2))
        .connect(db_url)
        .await
        .context("connecting to the database")
}

/// Applies the embedded migrations under `migrations/`
pub async fn migrate(pool: &PgPool) -> Result<(), anyhow::Error> {
    sqlx::migrate!()
        .run(pool)
        .await
        .context("running database migrations")?;
    info!("Database migrations applied");

    Ok(())
}
