use anyhow::Context;
use dotenv::dotenv;
use std::sync::Arc;
use todo_rest::app_env::AppConfig;
use todo_rest::auth::JwtKeys;
use todo_rest::{SharedData, app_router, db, logging, persistence};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    if dotenv().is_err() {
        println!("Starting without a .env file.");
    }

    let config = AppConfig::from_env()?;
    let otel_exporters = match config.otel {
        Some(ref endpoints) => Some(logging::init_exporters(endpoints)?),
        None => None,
    };
    logging::setup_logging_and_tracing(logging::init_env_filter()?, otel_exporters);

    let pool = db::connect_sqlx(&config.database_url).await?;
    db::migrate(&pool).await?;

    let shared_data = Arc::new(SharedData {
        ext_cxn: persistence::PgConnectivity::new(pool),
        jwt_keys: JwtKeys::new(config.jwt_secret.as_bytes(), config.jwt_ttl),
    });

    let listener = TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("binding to {}", config.bind_address))?;
    info!("Listening on {}", config.bind_address);

    axum::serve(listener, app_router(shared_data))
        .await
        .context("serving HTTP")?;

    Ok(())
}
