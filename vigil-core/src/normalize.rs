//! Turns whatever the vision model returned into a typed [`AnalysisRecord`].
//!
//! Transport errors and non-JSON text are absorbed into the fallback record.
//! JSON with the wrong shape is not: [`normalize`] returns the itemized
//! [`ValidationError`] so the request fails and nothing is stored.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{AnalysisRecord, DetectedItem, SafetyScore};
use crate::vision::VisionError;

pub const FALLBACK_ITEM_NAME: &str = "Analysis Error";
pub const FALLBACK_ACTION: &str = "Retry analysis or check system logs";
pub const FALLBACK_SUMMARY: &str = "Analysis could not be completed due to technical error.";
const DEFAULT_SUMMARY: &str = "Analysis completed.";

/// Every shape problem found in one model response, as `path: message`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", .issues.join("; "))]
pub struct ValidationError {
    pub issues: Vec<String>,
}

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("invalid JSON in model response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model response failed validation: {0}")]
    Validation(#[from] ValidationError),
}

/// Remove a surrounding markdown code fence (```` ```json ```` or ```` ``` ````).
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if text.get(..7).is_some_and(|tag| tag.eq_ignore_ascii_case("```json")) {
        text = &text[7..];
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parse and validate raw model text.
pub fn parse_record(raw: &str) -> Result<AnalysisRecord, NormalizeError> {
    let value: Value = serde_json::from_str(strip_code_fences(raw))?;
    Ok(validate(&value)?)
}

/// Synthetic record describing why an analysis could not be produced.
pub fn fallback_record(reason: &str) -> AnalysisRecord {
    AnalysisRecord {
        detected_items: vec![DetectedItem {
            category: "component".to_string(),
            name: FALLBACK_ITEM_NAME.to_string(),
            description: format!("Could not complete analysis: {}", reason),
            confidence: "low".to_string(),
            priority: "medium".to_string(),
            action: FALLBACK_ACTION.to_string(),
            location: Some("N/A".to_string()),
        }],
        overall_safety_score: SafetyScore::Unknown,
        summary: FALLBACK_SUMMARY.to_string(),
    }
}

/// The parsed record, or the fallback when the model call failed or its reply
/// was not JSON. A reply that parses but has the wrong shape is an error.
pub fn normalize(outcome: Result<String, VisionError>) -> Result<AnalysisRecord, ValidationError> {
    let raw = match outcome {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(error = %e, "Error in vision analysis");
            return Ok(fallback_record(&e.to_string()));
        }
    };

    match parse_record(&raw) {
        Ok(record) => Ok(record),
        Err(e @ NormalizeError::Json(_)) => {
            tracing::error!(error = %e, "Could not parse vision model response");
            Ok(fallback_record(&e.to_string()))
        }
        Err(NormalizeError::Validation(e)) => {
            tracing::error!(error = %e, "Vision model response failed validation");
            Err(e)
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Convert a parsed JSON document into a typed record, collecting every issue.
pub fn validate(value: &Value) -> Result<AnalysisRecord, ValidationError> {
    let mut issues = Vec::new();

    let Some(obj) = value.as_object() else {
        return Err(ValidationError {
            issues: vec![format!("$: expected object, got {}", json_type(value))],
        });
    };

    let detected_items = match obj.get("detected_items") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| validate_item(i, item, &mut issues))
            .collect(),
        Some(other) => {
            issues.push(format!("detected_items: expected array, got {}", json_type(other)));
            Vec::new()
        }
    };

    let overall_safety_score = match obj.get("overall_safety_score") {
        None | Some(Value::Null) => SafetyScore::Unknown,
        Some(Value::String(s)) => SafetyScore::parse(s).unwrap_or_else(|| {
            tracing::warn!(score = %s, "Unrecognized safety score from model, recording as Unknown");
            SafetyScore::Unknown
        }),
        Some(other) => {
            issues.push(format!(
                "overall_safety_score: expected string, got {}",
                json_type(other)
            ));
            SafetyScore::Unknown
        }
    };

    let summary = match obj.get("summary") {
        None | Some(Value::Null) => DEFAULT_SUMMARY.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            issues.push(format!("summary: expected string, got {}", json_type(other)));
            String::new()
        }
    };

    if !issues.is_empty() {
        return Err(ValidationError { issues });
    }

    Ok(AnalysisRecord {
        detected_items,
        overall_safety_score,
        summary,
    })
}

fn validate_item(index: usize, item: &Value, issues: &mut Vec<String>) -> Option<DetectedItem> {
    let path = format!("detected_items[{}]", index);
    let Some(obj) = item.as_object() else {
        issues.push(format!("{}: expected object, got {}", path, json_type(item)));
        return None;
    };

    let before = issues.len();

    let category = required_str(obj, &path, "category", issues);
    let name = required_str(obj, &path, "name", issues);
    let description = required_str(obj, &path, "description", issues);
    let confidence = required_str(obj, &path, "confidence", issues);
    let priority = required_str(obj, &path, "priority", issues);
    let action = required_str(obj, &path, "action", issues);

    let location = match obj.get("location") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            issues.push(format!("{}.location: expected string, got {}", path, json_type(other)));
            None
        }
    };

    if issues.len() > before {
        return None;
    }

    Some(DetectedItem {
        category: category?.to_string(),
        name: name?.to_string(),
        description: description?.to_string(),
        confidence: confidence?.to_string(),
        priority: priority?.to_string(),
        action: action?.to_string(),
        location,
    })
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    path: &str,
    field: &str,
    issues: &mut Vec<String>,
) -> Option<&'a str> {
    match obj.get(field) {
        Some(Value::String(s)) => Some(s.as_str()),
        None | Some(Value::Null) => {
            issues.push(format!("{}.{}: missing", path, field));
            None
        }
        Some(other) => {
            issues.push(format!("{}.{}: expected string, got {}", path, field, json_type(other)));
            None
        }
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
