//! Read paths. Both degrade instead of failing: existing dashboards expect an
//! empty list or zeroed counters when the store is unreachable.

use vigil_core::{Analysis, AnalysisStats, AnalysisStore};

pub async fn history_or_empty(store: &dyn AnalysisStore, limit: u32) -> Vec<Analysis> {
    match store.history(limit).await {
        Ok(analyses) => analyses,
        Err(e) => {
            tracing::error!(error = %e, store = store.name(), "Error getting history");
            Vec::new()
        }
    }
}

pub async fn stats_or_zero(store: &dyn AnalysisStore) -> AnalysisStats {
    match store.stats().await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!(error = %e, store = store.name(), "Error getting stats");
            AnalysisStats::default()
        }
    }
}
