//! Append-only persistence for [`Analysis`] records.
//!
//! - `PgAnalysisStore` — production store on the shared `PgPool`
//! - `MemoryAnalysisStore` — process-local store for tests and `--memory` runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Analysis, AnalysisStats, DetectedItem, SafetyScore};

/// Default page size for history queries.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Insert one record. No upsert, no deduplication.
    async fn save(&self, analysis: &Analysis) -> Result<(), StoreError>;

    /// Most recent `limit` records, newest first; ties broken by id descending.
    async fn history(&self, limit: u32) -> Result<Vec<Analysis>, StoreError>;

    /// Total count plus per-score counts.
    async fn stats(&self) -> Result<AnalysisStats, StoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// PgAnalysisStore
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgAnalysisStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    image_name: String,
    detected_items: Json<Vec<DetectedItem>>,
    overall_safety_score: String,
    summary: String,
}

/// Rows come back as written; a score outside the named set stays `Other`,
/// matching how `stats` leaves it out of every bucket.
impl From<AnalysisRow> for Analysis {
    fn from(row: AnalysisRow) -> Self {
        Analysis {
            id: row.id,
            timestamp: row.created_at,
            image_name: row.image_name,
            detected_items: row.detected_items.0,
            overall_safety_score: SafetyScore::from(row.overall_safety_score),
            summary: row.summary,
        }
    }
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn save(&self, analysis: &Analysis) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO analyses
                (id, created_at, image_name, detected_items, overall_safety_score, summary)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(analysis.id)
        .bind(analysis.timestamp)
        .bind(&analysis.image_name)
        .bind(Json(&analysis.detected_items))
        .bind(analysis.overall_safety_score.as_str())
        .bind(&analysis.summary)
        .execute(&self.pool)
        .await?;

        tracing::info!(id = %analysis.id, score = %analysis.overall_safety_score, "Analysis stored");
        Ok(())
    }

    async fn history(&self, limit: u32) -> Result<Vec<Analysis>, StoreError> {
        let rows = sqlx::query_as::<_, AnalysisRow>(
            r#"
            SELECT id, created_at, image_name, detected_items, overall_safety_score, summary
            FROM analyses
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Analysis::from).collect())
    }

    async fn stats(&self) -> Result<AnalysisStats, StoreError> {
        let (total, safe, caution, danger, unknown): (i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE overall_safety_score = 'Safe'),
                COUNT(*) FILTER (WHERE overall_safety_score = 'Caution'),
                COUNT(*) FILTER (WHERE overall_safety_score = 'Danger'),
                COUNT(*) FILTER (WHERE overall_safety_score = 'Unknown')
            FROM analyses
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AnalysisStats {
            total_analyses: total.max(0) as u64,
            safe_count: safe.max(0) as u64,
            caution_count: caution.max(0) as u64,
            danger_count: danger.max(0) as u64,
            unknown_count: unknown.max(0) as u64,
        })
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// MemoryAnalysisStore
// ============================================================================

/// Keeps records in insertion order; queries sort on read.
#[derive(Debug, Default)]
pub struct MemoryAnalysisStore {
    records: RwLock<Vec<Analysis>>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn save(&self, analysis: &Analysis) -> Result<(), StoreError> {
        self.records.write().await.push(analysis.clone());
        tracing::debug!(id = %analysis.id, "Analysis stored in memory");
        Ok(())
    }

    async fn history(&self, limit: u32) -> Result<Vec<Analysis>, StoreError> {
        let records = self.records.read().await;
        let mut sorted: Vec<&Analysis> = records.iter().collect();
        sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(sorted
            .into_iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<AnalysisStats, StoreError> {
        let records = self.records.read().await;
        let mut stats = AnalysisStats {
            total_analyses: records.len() as u64,
            ..AnalysisStats::default()
        };
        for a in records.iter() {
            match &a.overall_safety_score {
                SafetyScore::Safe => stats.safe_count += 1,
                SafetyScore::Caution => stats.caution_count += 1,
                SafetyScore::Danger => stats.danger_count += 1,
                SafetyScore::Unknown => stats.unknown_count += 1,
                SafetyScore::Other(_) => {}
            }
        }
        Ok(stats)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
