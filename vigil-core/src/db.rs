use crate::config::DatabaseConfig;
use crate::error::VigilError;
use sqlx::{postgres::PgPoolOptions, PgPool};

const CREATE_ANALYSES: &str = r#"
CREATE TABLE IF NOT EXISTS analyses (
    id                   UUID PRIMARY KEY,
    created_at           TIMESTAMPTZ NOT NULL,
    image_name           TEXT NOT NULL,
    detected_items       JSONB NOT NULL DEFAULT '[]'::jsonb,
    overall_safety_score TEXT NOT NULL,
    summary              TEXT NOT NULL
)
"#;

const CREATE_ANALYSES_RECENT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS analyses_recent_idx
    ON analyses (created_at DESC, id DESC)
"#;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Create the `analyses` table and its recency index if missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_ANALYSES).execute(pool).await?;
    sqlx::query(CREATE_ANALYSES_RECENT_INDEX).execute(pool).await?;
    tracing::debug!("analyses schema ready");
    Ok(())
}

/// Open the pool and make sure the schema exists. The caller owns the pool
/// and is expected to `close()` it on shutdown.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, VigilError> {
    let pool = create_pool(config).await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}
