//! Parcel record sourced from the external land-records provider

use parcel_common::{Coordinate, ParcelBoundary};
use serde::{Deserialize, Serialize};

/// Situs address components
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParcelAddress {
    pub line: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

/// Assessed valuation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub total: Option<f64>,
    pub improvements: Option<f64>,
    pub land: Option<f64>,
}

/// One parcel as returned by the provider
///
/// Immutable for the lifetime of its cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelRecord {
    pub parcel_number: String,
    /// Provider-reported centroid; property records are keyed on it
    pub reference_point: Coordinate,
    pub address: ParcelAddress,
    pub owner_name: Option<String>,
    pub owner_mailing_address: Option<String>,
    pub year_built: Option<i32>,
    pub valuation: Valuation,
    pub zoning: Option<String>,
    pub boundary: Option<ParcelBoundary>,
    /// Parcels within the density-hint radius, when requested
    pub nearby_parcel_count: Option<u32>,
}
