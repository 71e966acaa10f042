use std::time::Duration;

use anyhow::{bail, Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Tables the pipeline reads and writes. Provisioned outside this service.
const REQUIRED_TABLES: [&str; 3] = ["companies", "jobs", "target_jobs"];

/// Creates a PostgreSQL connection pool and checks the schema is in place.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    verify_schema(&pool).await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

async fn verify_schema(pool: &PgPool) -> Result<()> {
    let present: Vec<String> = sqlx::query_scalar(
        "SELECT table_name::TEXT FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = ANY($1)",
    )
    .bind(&REQUIRED_TABLES[..])
    .fetch_all(pool)
    .await
    .context("Failed to inspect database schema")?;

    let missing = missing_tables(&present);
    if !missing.is_empty() {
        bail!("Database schema is missing tables: {}", missing.join(", "));
    }
    Ok(())
}

fn missing_tables(present: &[String]) -> Vec<&'static str> {
    REQUIRED_TABLES
        .iter()
        .copied()
        .filter(|table| !present.iter().any(|p| p == table))
        .collect()
}
