//! In-process stand-ins for the external providers

use async_trait::async_trait;
use parcel_common::{Coordinate, ParcelBoundary};
use parcel_matcher::models::{ParcelAddress, ParcelRecord, Valuation};
use parcel_matcher::services::geocoding::{GeocodeError, GeocodeResult, GeocodingProvider};
use parcel_matcher::services::{LookupFailure, ParcelProvider, ParcelQuery};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Parcel provider that answers every query with the same parcel list
pub struct MockParcelProvider {
    parcels: Vec<ParcelRecord>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockParcelProvider {
    pub fn serving(parcels: Vec<ParcelRecord>) -> Arc<Self> {
        Arc::new(Self {
            parcels,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    /// Like `serving`, with each call held for `delay`
    pub fn slow(parcels: Vec<ParcelRecord>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            parcels,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParcelProvider for MockParcelProvider {
    async fn fetch_parcels(&self, query: &ParcelQuery) -> Result<Vec<ParcelRecord>, LookupFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.parcels.iter().take(query.limit as usize).cloned().collect())
    }
}

/// Parcel centered on `center` with a square boundary of `half_side` degrees
pub fn fixture_parcel(parcel_number: &str, center: Coordinate, half_side: f64) -> ParcelRecord {
    let (lat, lon) = (center.latitude, center.longitude);
    ParcelRecord {
        parcel_number: parcel_number.to_string(),
        reference_point: center,
        address: ParcelAddress {
            line: Some("12 Orchard Ln".to_string()),
            city: Some("Lancaster".to_string()),
            state: Some("PA".to_string()),
            postal_code: Some("17601".to_string()),
        },
        owner_name: Some("Orchard Holdings LLC".to_string()),
        owner_mailing_address: Some("PO Box 9, Lancaster PA".to_string()),
        year_built: Some(1978),
        valuation: Valuation {
            total: Some(310_000.0),
            improvements: Some(220_000.0),
            land: Some(90_000.0),
        },
        zoning: Some("R-1".to_string()),
        boundary: Some(ParcelBoundary::new(vec![
            [lon - half_side, lat - half_side],
            [lon - half_side, lat + half_side],
            [lon + half_side, lat + half_side],
            [lon + half_side, lat - half_side],
            [lon - half_side, lat - half_side],
        ])),
        nearby_parcel_count: None,
    }
}

/// Geocoder that always resolves to the same address
pub struct FixedGeocoder {
    pub address: String,
}

#[async_trait]
impl GeocodingProvider for FixedGeocoder {
    async fn reverse_geocode(&self, _coordinate: &Coordinate) -> Result<Option<GeocodeResult>, GeocodeError> {
        Ok(Some(GeocodeResult {
            formatted_address: self.address.clone(),
            place_id: None,
            location_type: Some("ROOFTOP".to_string()),
            components: Vec::new(),
        }))
    }
}
