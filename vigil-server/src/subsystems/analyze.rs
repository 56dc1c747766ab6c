use serde::Deserialize;
use thiserror::Error;
use vigil_core::normalize::{normalize, ValidationError};
use vigil_core::{Analysis, AnalysisStore, StoreError, VisionError, VisionModel};

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub image_base64: String,
    pub image_name: String,
}

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("{0}")]
    Config(VisionError),

    #[error("Invalid model response: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to store analysis: {0}")]
    Store(#[from] StoreError),
}

/// Model call → normalize → build → save. Model and JSON parse failures come
/// back as a stored fallback analysis; configuration, validation and storage
/// errors reach the caller and nothing is stored.
pub async fn run_analysis(
    vision: &dyn VisionModel,
    store: &dyn AnalysisStore,
    request: AnalyzeRequest,
) -> Result<Analysis, AnalyzeError> {
    tracing::info!(
        image_name = %request.image_name,
        payload_bytes = request.image_base64.len(),
        model = vision.name(),
        "Analyzing image"
    );

    let outcome = match vision.analyze_image(&request.image_base64).await {
        Err(e) if e.is_config() => {
            tracing::error!(error = %e, "Vision model is not configured");
            return Err(AnalyzeError::Config(e));
        }
        other => other,
    };

    let record = normalize(outcome)?;
    let analysis = Analysis::from_record(record, request.image_name);
    store.save(&analysis).await?;

    tracing::info!(
        id = %analysis.id,
        score = %analysis.overall_safety_score,
        items = analysis.detected_items.len(),
        store = store.name(),
        "Analysis complete"
    );

    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vigil_core::normalize::FALLBACK_ITEM_NAME;
    use vigil_core::{MemoryAnalysisStore, SafetyScore};

    struct CannedVision(fn() -> Result<String, VisionError>);

    #[async_trait]
    impl VisionModel for CannedVision {
        async fn analyze_image(&self, _image_base64: &str) -> Result<String, VisionError> {
            (self.0)()
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn request() -> AnalyzeRequest {
        AnalyzeRequest {
            image_base64: "aGVsbG8=".to_string(),
            image_name: "dock-7.jpg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_analysis_is_stored() {
        let vision = CannedVision(|| {
            Ok(r#"{"detected_items":[],"overall_safety_score":"Safe","summary":"All clear"}"#.to_string())
        });
        let store = MemoryAnalysisStore::new();

        let analysis = run_analysis(&vision, &store, request()).await.unwrap();

        assert_eq!(analysis.overall_safety_score, SafetyScore::Safe);
        assert_eq!(analysis.image_name, "dock-7.jpg");
        let history = store.history(50).await.unwrap();
        assert_eq!(history, vec![analysis]);
    }

    #[tokio::test]
    async fn test_model_failure_stores_fallback() {
        let vision = CannedVision(|| Err(VisionError::EmptyResponse));
        let store = MemoryAnalysisStore::new();

        let analysis = run_analysis(&vision, &store, request()).await.unwrap();

        assert_eq!(analysis.overall_safety_score, SafetyScore::Unknown);
        assert_eq!(analysis.detected_items.len(), 1);
        assert_eq!(analysis.detected_items[0].name, FALLBACK_ITEM_NAME);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_absorbed() {
        let vision = CannedVision(|| Err(VisionError::MissingApiKey));
        let store = MemoryAnalysisStore::new();

        let err = run_analysis(&vision, &store, request()).await.unwrap_err();

        assert!(matches!(err, AnalyzeError::Config(VisionError::MissingApiKey)));
        assert!(store.is_empty().await, "nothing is stored on configuration errors");
    }

    #[tokio::test]
    async fn test_malformed_items_fail_without_storing() {
        let vision = CannedVision(|| {
            Ok(r#"{"detected_items":[{"category":"hazard","name":"Oil Spill"}],"overall_safety_score":"Danger","summary":"s"}"#.to_string())
        });
        let store = MemoryAnalysisStore::new();

        let err = run_analysis(&vision, &store, request()).await.unwrap_err();

        match err {
            AnalyzeError::Validation(e) => {
                assert!(e.issues.contains(&"detected_items[0].action: missing".to_string()));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(store.is_empty().await);
    }
}
