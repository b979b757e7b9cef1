//! Monte Carlo consensus geocoder
//!
//! A single reverse geocode of a noisy GPS fix can land on the neighbour's
//! address. This samples Gaussian perturbations of the fix within the error
//! radius, reverse-geocodes each one and reports the most frequent address.
//!
//! Confidence is `mode_count / samples`. Failed samples count as "no address"
//! and still belong to the denominator.

use super::geocoding::GeocodingProvider;
use crate::config::GeocoderConfig;
use parcel_common::geometry::meters_to_degree_offset;
use parcel_common::Coordinate;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

/// One perturbed probe and what the provider returned for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeSample {
    pub coordinate: Coordinate,
    pub address: Option<String>,
}

/// Address with its sample count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressTally {
    pub address: String,
    pub count: usize,
}

/// Consensus over all samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub origin: Coordinate,
    pub error_radius_m: f64,
    /// Most frequent address; ties go to the one seen first
    pub address: Option<String>,
    pub confidence: f64,
    /// Tallies in first-seen order
    pub tallies: Vec<AddressTally>,
    pub samples: Vec<GeocodeSample>,
}

impl ConsensusResult {
    /// Whether the consensus address matches `expected`, ignoring case and spacing
    pub fn verify_address(&self, expected: &str) -> bool {
        self.address
            .as_deref()
            .map(|address| normalize_address(address) == normalize_address(expected))
            .unwrap_or(false)
    }
}

fn normalize_address(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Monte Carlo sampler over a [`GeocodingProvider`]
pub struct ConsensusGeocoder {
    provider: Arc<dyn GeocodingProvider>,
    config: GeocoderConfig,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl ConsensusGeocoder {
    pub fn new(provider: Arc<dyn GeocodingProvider>, config: GeocoderConfig) -> Self {
        Self::with_rng(provider, config, StdRng::from_entropy())
    }

    /// Deterministic sampling with a caller-supplied generator
    pub fn with_rng(
        provider: Arc<dyn GeocodingProvider>,
        config: GeocoderConfig,
        rng: impl RngCore + Send + 'static,
    ) -> Self {
        Self {
            provider,
            config,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Perturbed probe positions around `origin`
    ///
    /// Offsets are standard normal draws (Box–Muller) scaled so one sigma
    /// equals `error_radius_m`.
    fn sample_coordinates(&self, origin: &Coordinate, error_radius_m: f64) -> Vec<Coordinate> {
        let (lat_per_sigma, lng_per_sigma) = meters_to_degree_offset(error_radius_m, origin.latitude);
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        (0..self.config.samples)
            .map(|_| {
                // u1 in (0, 1] keeps ln() finite
                let u1: f64 = 1.0 - rng.gen::<f64>();
                let u2: f64 = rng.gen::<f64>();
                let r = (-2.0 * u1.ln()).sqrt();
                let z1 = r * (2.0 * PI * u2).cos();
                let z2 = r * (2.0 * PI * u2).sin();

                let latitude = (origin.latitude + z1 * lat_per_sigma).clamp(-90.0, 90.0);
                let mut longitude = origin.longitude + z2 * lng_per_sigma;
                if longitude > 180.0 {
                    longitude -= 360.0;
                } else if longitude < -180.0 {
                    longitude += 360.0;
                }
                Coordinate::new(latitude, longitude)
            })
            .collect()
    }

    /// Run the sampler around `origin`
    ///
    /// `accuracy_m` is the device-reported GPS accuracy; absent or
    /// non-positive values fall back to the configured default radius.
    pub async fn geocode(&self, origin: &Coordinate, accuracy_m: Option<f64>) -> ConsensusResult {
        let error_radius_m = accuracy_m
            .filter(|a| a.is_finite() && *a > 0.0)
            .unwrap_or(self.config.default_error_radius_m);

        let probes = self.sample_coordinates(origin, error_radius_m);
        let throttle = self.config.throttle();
        let total = probes.len();

        let mut samples = Vec::with_capacity(total);
        let mut tallies: Vec<AddressTally> = Vec::new();
        let mut failures = 0usize;

        for (i, probe) in probes.into_iter().enumerate() {
            let address = match self.provider.reverse_geocode(&probe).await {
                Ok(result) => result.map(|r| r.formatted_address),
                Err(e) => {
                    failures += 1;
                    tracing::debug!(sample = i, error = %e, "Reverse geocode sample failed");
                    None
                }
            };

            if let Some(address) = &address {
                match tallies.iter_mut().find(|t| &t.address == address) {
                    Some(tally) => tally.count += 1,
                    None => tallies.push(AddressTally {
                        address: address.clone(),
                        count: 1,
                    }),
                }
            }
            samples.push(GeocodeSample {
                coordinate: probe,
                address,
            });

            if i + 1 < total && !throttle.is_zero() {
                tokio::time::sleep(throttle).await;
            }
        }

        // First maximum wins, so ties go to the earliest-seen address
        let mode = tallies
            .iter()
            .fold(None::<&AddressTally>, |best, t| match best {
                Some(b) if b.count >= t.count => Some(b),
                _ => Some(t),
            });
        let (address, confidence) = match mode {
            Some(t) if total > 0 => (Some(t.address.clone()), t.count as f64 / total as f64),
            _ => (None, 0.0),
        };

        if failures > 0 {
            tracing::warn!(
                failures,
                samples = total,
                "Consensus geocode completed with failed samples"
            );
        }
        tracing::info!(
            origin = %origin,
            address = address.as_deref().unwrap_or("<none>"),
            confidence,
            "Consensus geocode complete"
        );

        ConsensusResult {
            origin: *origin,
            error_radius_m,
            address,
            confidence,
            tallies,
            samples,
        }
    }
}
