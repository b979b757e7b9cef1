//! Match outcome types

use super::ConfidenceBreakdown;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// How a photo's outcome was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    NoCoordinates,
    InvalidCoordinates,
    NoParcelData,
    CoordinateOutsideParcel,
    LowConfidence,
    ParcelMatch,
    ManualAssignment,
    Error,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::NoCoordinates => "no_coordinates",
            MatchMethod::InvalidCoordinates => "invalid_coordinates",
            MatchMethod::NoParcelData => "no_parcel_data",
            MatchMethod::CoordinateOutsideParcel => "coordinate_outside_parcel",
            MatchMethod::LowConfidence => "low_confidence",
            MatchMethod::ParcelMatch => "parcel_match",
            MatchMethod::ManualAssignment => "manual_assignment",
            MatchMethod::Error => "error",
        }
    }
}

/// Result of running one photo through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched {
        property_id: Uuid,
        confidence: f64,
        method: MatchMethod,
        parcel_number: Option<String>,
        factors: ConfidenceBreakdown,
    },
    Unassigned {
        method: MatchMethod,
        reason: String,
        confidence: Option<f64>,
        factors: Option<ConfidenceBreakdown>,
    },
    Error {
        message: String,
    },
}

impl MatchOutcome {
    pub fn unassigned(method: MatchMethod, reason: impl Into<String>) -> Self {
        MatchOutcome::Unassigned {
            method,
            reason: reason.into(),
            confidence: None,
            factors: None,
        }
    }

    pub fn method(&self) -> MatchMethod {
        match self {
            MatchOutcome::Matched { method, .. } => *method,
            MatchOutcome::Unassigned { method, .. } => *method,
            MatchOutcome::Error { .. } => MatchMethod::Error,
        }
    }

    pub fn property_id(&self) -> Option<Uuid> {
        match self {
            MatchOutcome::Matched { property_id, .. } => Some(*property_id),
            _ => None,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            MatchOutcome::Matched { confidence, .. } => Some(*confidence),
            MatchOutcome::Unassigned { confidence, .. } => *confidence,
            MatchOutcome::Error { .. } => None,
        }
    }

    /// Human-readable reason for anything other than a match
    pub fn reason(&self) -> Option<String> {
        match self {
            MatchOutcome::Matched { .. } => None,
            MatchOutcome::Unassigned { reason, .. } => Some(reason.clone()),
            MatchOutcome::Error { message } => Some(format!("error: {}", message)),
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, MatchOutcome::Matched { .. })
    }
}

/// Outcome for one photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub photo_id: Uuid,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
}

/// Structured metadata persisted on the photo row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMetadata {
    pub method: MatchMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub matched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parcel_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factors: Option<ConfidenceBreakdown>,
}

impl MatchMetadata {
    pub fn from_outcome(outcome: &MatchOutcome, at: DateTime<Utc>) -> Self {
        let (parcel_number, factors) = match outcome {
            MatchOutcome::Matched {
                parcel_number,
                factors,
                ..
            } => (parcel_number.clone(), Some(factors.clone())),
            MatchOutcome::Unassigned { factors, .. } => (None, factors.clone()),
            MatchOutcome::Error { .. } => (None, None),
        };
        Self {
            method: outcome.method(),
            reason: outcome.reason(),
            matched_at: at,
            parcel_number,
            factors,
        }
    }
}

/// Per-batch tally returned alongside the individual results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub matched: usize,
    pub by_method: BTreeMap<MatchMethod, usize>,
    /// Photos never started because the run was cancelled
    pub skipped: usize,
    pub results: Vec<MatchResult>,
}

impl BatchSummary {
    pub fn from_results(results: Vec<MatchResult>) -> Self {
        let mut by_method = BTreeMap::new();
        for result in &results {
            *by_method.entry(result.outcome.method()).or_insert(0) += 1;
        }
        Self {
            total: results.len(),
            matched: results.iter().filter(|r| r.outcome.is_matched()).count(),
            by_method,
            skipped: 0,
            results,
        }
    }

    pub fn with_skipped(mut self, skipped: usize) -> Self {
        self.skipped = skipped;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_outcome_reason_is_prefixed() {
        let outcome = MatchOutcome::Error {
            message: "provider unavailable".to_string(),
        };
        assert_eq!(outcome.method(), MatchMethod::Error);
        assert_eq!(outcome.reason().as_deref(), Some("error: provider unavailable"));
        assert_eq!(outcome.property_id(), None);
    }

    #[test]
    fn test_method_serializes_snake_case() {
        let json = serde_json::to_string(&MatchMethod::CoordinateOutsideParcel).unwrap();
        assert_eq!(json, "\"coordinate_outside_parcel\"");
        assert_eq!(MatchMethod::CoordinateOutsideParcel.as_str(), "coordinate_outside_parcel");
    }

    #[test]
    fn test_batch_summary_counts_methods() {
        let results = vec![
            MatchResult {
                photo_id: Uuid::new_v4(),
                outcome: MatchOutcome::unassigned(MatchMethod::NoCoordinates, "no coordinates"),
            },
            MatchResult {
                photo_id: Uuid::new_v4(),
                outcome: MatchOutcome::unassigned(MatchMethod::NoCoordinates, "no coordinates"),
            },
            MatchResult {
                photo_id: Uuid::new_v4(),
                outcome: MatchOutcome::Error {
                    message: "boom".to_string(),
                },
            },
        ];
        let summary = BatchSummary::from_results(results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.matched, 0);
        assert_eq!(summary.by_method.get(&MatchMethod::NoCoordinates), Some(&2));
        assert_eq!(summary.by_method.get(&MatchMethod::Error), Some(&1));
    }

    #[test]
    fn test_metadata_from_unassigned_outcome() {
        let outcome = MatchOutcome::unassigned(MatchMethod::NoParcelData, "no parcel data");
        let meta = MatchMetadata::from_outcome(&outcome, Utc::now());
        assert_eq!(meta.method, MatchMethod::NoParcelData);
        assert_eq!(meta.reason.as_deref(), Some("no parcel data"));
        assert!(meta.factors.is_none());
    }
}
