use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse overall judgment of a scene.
///
/// New analyses always carry one of the four named scores. `Other` only
/// appears when a stored row holds a value outside that set; it is kept
/// verbatim so history shows what was written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SafetyScore {
    Safe,
    Caution,
    Danger,
    Unknown,
    Other(String),
}

impl SafetyScore {
    pub const ALL: [SafetyScore; 4] = [Self::Safe, Self::Caution, Self::Danger, Self::Unknown];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Safe => "Safe",
            Self::Caution => "Caution",
            Self::Danger => "Danger",
            Self::Unknown => "Unknown",
            Self::Other(raw) => raw,
        }
    }

    /// Case-insensitive match against the four named scores.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|score| score.as_str().eq_ignore_ascii_case(s))
    }
}

/// Exact match only; anything else is carried as `Other`.
impl From<String> for SafetyScore {
    fn from(raw: String) -> Self {
        Self::ALL
            .into_iter()
            .find(|score| score.as_str() == raw)
            .unwrap_or(Self::Other(raw))
    }
}

impl From<SafetyScore> for String {
    fn from(score: SafetyScore) -> Self {
        match score {
            SafetyScore::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for SafetyScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One component or hazard found in an image.
///
/// `category` is usually "component" or "hazard", and `confidence` and
/// `priority` usually "high", "medium" or "low", but the model's wording is
/// kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedItem {
    pub category: String,
    pub name: String,
    pub description: String,
    pub confidence: String,
    pub priority: String,
    pub action: String,
    pub location: Option<String>,
}

/// Validated model output, before it is stamped into an [`Analysis`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub detected_items: Vec<DetectedItem>,
    pub overall_safety_score: SafetyScore,
    pub summary: String,
}

/// One stored evaluation of a single image. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub image_name: String,
    pub detected_items: Vec<DetectedItem>,
    pub overall_safety_score: SafetyScore,
    pub summary: String,
}

impl Analysis {
    /// Stamp a record with a fresh id and the current UTC time.
    ///
    /// The timestamp is truncated to microseconds, the precision of
    /// `timestamptz`, so the returned value matches what history reads back.
    pub fn from_record(record: AnalysisRecord, image_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now().trunc_subsecs(6),
            image_name: image_name.into(),
            detected_items: record.detected_items,
            overall_safety_score: record.overall_safety_score,
            summary: record.summary,
        }
    }
}

/// Aggregate counts over every stored analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub total_analyses: u64,
    pub safe_count: u64,
    pub caution_count: u64,
    pub danger_count: u64,
    pub unknown_count: u64,
}
