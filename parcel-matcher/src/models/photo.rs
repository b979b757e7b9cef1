//! Photo record as seen by the matching engine

use super::MatchMetadata;
use chrono::{DateTime, Utc};
use parcel_common::RawDegrees;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Photo processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Processed,
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ProcessingStatus::Pending),
            "processing" => Some(ProcessingStatus::Processing),
            "processed" => Some(ProcessingStatus::Processed),
            "error" => Some(ProcessingStatus::Error),
            _ => None,
        }
    }
}

/// One uploaded photo
///
/// Coordinates are kept raw until the orchestrator validates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: Uuid,
    pub batch_id: Option<String>,
    pub latitude: Option<RawDegrees>,
    pub longitude: Option<RawDegrees>,
    /// Meters above sea level
    pub altitude: Option<f64>,
    /// Device heading at capture (degrees clockwise from north)
    pub heading: Option<f64>,
    pub captured_at: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub processing_status: ProcessingStatus,
    pub property_id: Option<Uuid>,
    pub match_confidence: Option<f64>,
    pub match_metadata: Option<MatchMetadata>,
}

impl PhotoRecord {
    /// New pending photo with no capture metadata
    pub fn new(latitude: Option<RawDegrees>, longitude: Option<RawDegrees>) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id: None,
            latitude,
            longitude,
            altitude: None,
            heading: None,
            captured_at: None,
            device_id: None,
            processing_status: ProcessingStatus::Pending,
            property_id: None,
            match_confidence: None,
            match_metadata: None,
        }
    }

    /// New pending photo at a numeric position
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self::new(Some(latitude.into()), Some(longitude.into()))
    }

    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// True when the photo carries any capture metadata worth scoring
    pub fn has_capture_metadata(&self) -> bool {
        self.captured_at.is_some() || self.altitude.is_some()
    }

    /// Whether the current assignment was made by an operator
    pub fn is_manual_assignment(&self) -> bool {
        self.match_metadata
            .as_ref()
            .map(|m| m.method == super::MatchMethod::ManualAssignment)
            .unwrap_or(false)
    }
}
