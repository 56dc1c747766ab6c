pub mod analysis;

pub use analysis::{Analysis, AnalysisRecord, AnalysisStats, DetectedItem, SafetyScore};
