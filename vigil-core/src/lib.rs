pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod normalize;
pub mod store;
pub mod vision;

pub use config::VigilConfig;
pub use error::VigilError;
pub use models::{Analysis, AnalysisRecord, AnalysisStats, DetectedItem, SafetyScore};
pub use normalize::{fallback_record, normalize, ValidationError};
pub use store::{AnalysisStore, MemoryAnalysisStore, PgAnalysisStore, StoreError};
pub use vision::{OpenAiVisionClient, VisionClientConfig, VisionError, VisionModel};
