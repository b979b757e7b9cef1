//! Confidence breakdown recorded with every scored match

use serde::{Deserialize, Serialize};

/// One contributing factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub name: String,
    /// Measured value (meters, degrees, hours...), if one exists
    pub value: Option<f64>,
    /// Factor score in [0, 1]
    pub score: f64,
    pub weight: f64,
    /// `score * weight` within its category
    pub contribution: f64,
}

impl FactorScore {
    pub fn new(name: &str, value: Option<f64>, score: f64, weight: f64) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            name: name.to_string(),
            value,
            score,
            weight,
            contribution: score * weight,
        }
    }
}

/// Full scoring audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub spatial_score: f64,
    /// `None` when the photo had no capture metadata to score
    pub metadata_score: Option<f64>,
    pub overall: f64,
    pub threshold: f64,
    pub spatial: Vec<FactorScore>,
    pub metadata: Vec<FactorScore>,
}

impl ConfidenceBreakdown {
    pub fn meets_threshold(&self) -> bool {
        self.overall >= self.threshold
    }

    pub fn factor(&self, name: &str) -> Option<&FactorScore> {
        self.spatial
            .iter()
            .chain(self.metadata.iter())
            .find(|f| f.name == name)
    }
}
