//! Confidence Scorer
//!
//! Weighted evidence combination for a photo/parcel pair.
//!
//! **Spatial factors** (photo position against the parcel):
//! - `coordinate_delta`: degree-space distance to the reference point, binary
//! - `distance`: Haversine meters to the reference point, binary
//! - `bearing`: bearing from photo to reference point against the reference heading, binary
//! - `centeredness`: offset from the boundary's bounding-box center, continuous
//!
//! **Metadata factors** (capture plausibility):
//! - `timestamp`: not in the future and not older than the age limit, binary
//! - `altitude`: within tolerance of the reference altitude, neutral when unknown
//! - `orientation`: always passes until device orientation is captured
//!
//! Overall = `spatial_share * spatial + metadata_share * metadata`, or the
//! spatial score alone when the photo has no metadata to judge.

use crate::config::ScoringConfig;
use crate::models::{ConfidenceBreakdown, FactorScore};
use chrono::{DateTime, Utc};
use parcel_common::geometry::{angular_difference, bearing_degrees, coordinate_delta, distance_meters};
use parcel_common::{Clock, Coordinate, ParcelBoundary, SystemClock};
use std::sync::Arc;

/// Positions compared by the spatial factors
#[derive(Debug, Clone, Copy)]
pub struct SpatialEvidence<'a> {
    pub photo: Coordinate,
    /// Parcel reference point
    pub reference: Coordinate,
    pub boundary: Option<&'a ParcelBoundary>,
    /// Heading recorded by the capture device
    pub heading: Option<f64>,
}

/// Capture metadata compared by the metadata factors
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataEvidence {
    pub captured_at: Option<DateTime<Utc>>,
    pub altitude: Option<f64>,
    /// Mean altitude of the photo's batch siblings
    pub reference_altitude: Option<f64>,
}

pub struct ConfidenceScorer {
    config: ScoringConfig,
    clock: Arc<dyn Clock>,
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ScoringConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn threshold(&self) -> f64 {
        self.config.acceptance_threshold
    }

    /// Score a candidate; `metadata: None` selects the spatial-only variant
    pub fn score(
        &self,
        spatial: &SpatialEvidence<'_>,
        metadata: Option<&MetadataEvidence>,
    ) -> ConfidenceBreakdown {
        let spatial_factors = self.spatial_factors(spatial);
        let spatial_score = total(&spatial_factors);

        let (metadata_factors, metadata_score) = match metadata {
            Some(evidence) => {
                let factors = self.metadata_factors(evidence);
                let score = total(&factors);
                (factors, Some(score))
            }
            None => (Vec::new(), None),
        };

        let overall = match metadata_score {
            Some(m) => self.config.spatial_share * spatial_score + self.config.metadata_share * m,
            None => spatial_score,
        }
        .clamp(0.0, 1.0);

        ConfidenceBreakdown {
            spatial_score,
            metadata_score,
            overall,
            threshold: self.config.acceptance_threshold,
            spatial: spatial_factors,
            metadata: metadata_factors,
        }
    }

    fn spatial_factors(&self, evidence: &SpatialEvidence<'_>) -> Vec<FactorScore> {
        let weights = &self.config.spatial_weights;

        let delta = coordinate_delta(&evidence.photo, &evidence.reference);
        let distance = distance_meters(&evidence.photo, &evidence.reference);

        let reference_heading = evidence.heading.unwrap_or(self.config.reference_heading_deg);
        let (bearing_value, bearing_ok) = if distance == 0.0 {
            // Coincident points have no bearing
            (None, true)
        } else {
            let deviation = angular_difference(
                bearing_degrees(&evidence.photo, &evidence.reference),
                reference_heading,
            );
            (Some(deviation), deviation <= self.config.bearing_tolerance_deg)
        };

        let centeredness = evidence
            .boundary
            .map(|b| b.centeredness(&evidence.photo))
            .unwrap_or(0.0);

        vec![
            FactorScore::new(
                "coordinate_delta",
                Some(delta),
                binary(delta <= self.config.max_coordinate_delta_deg),
                weights.coordinate_delta,
            ),
            FactorScore::new(
                "distance",
                Some(distance),
                binary(distance <= self.config.max_distance_m),
                weights.distance,
            ),
            FactorScore::new("bearing", bearing_value, binary(bearing_ok), weights.bearing),
            FactorScore::new(
                "centeredness",
                Some(centeredness),
                centeredness,
                weights.centeredness,
            ),
        ]
    }

    fn metadata_factors(&self, evidence: &MetadataEvidence) -> Vec<FactorScore> {
        let weights = &self.config.metadata_weights;
        let now = self.clock.now();

        let (age_hours, timestamp_ok) = match evidence.captured_at {
            Some(captured_at) => {
                let age = now - captured_at;
                let plausible = captured_at <= now
                    && age <= chrono::Duration::days(self.config.max_photo_age_days);
                (Some(age.num_seconds() as f64 / 3600.0), plausible)
            }
            None => (None, false),
        };

        let (altitude_diff, altitude_score) = match (evidence.altitude, evidence.reference_altitude) {
            (Some(altitude), Some(reference)) => {
                let diff = (altitude - reference).abs();
                (Some(diff), binary(diff <= self.config.altitude_tolerance_m))
            }
            _ => (None, self.config.unknown_altitude_score),
        };

        vec![
            FactorScore::new("timestamp", age_hours, binary(timestamp_ok), weights.timestamp),
            FactorScore::new("altitude", altitude_diff, altitude_score, weights.altitude),
            FactorScore::new("orientation", None, 1.0, weights.orientation),
        ]
    }
}

fn binary(pass: bool) -> f64 {
    if pass {
        1.0
    } else {
        0.0
    }
}

fn total(factors: &[FactorScore]) -> f64 {
    factors.iter().map(|f| f.contribution).sum::<f64>().clamp(0.0, 1.0)
}
