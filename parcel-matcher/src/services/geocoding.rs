//! Reverse geocoding provider
//!
//! Google-style `geocode/json` reverse lookups restricted to street-level
//! result types. `ZERO_RESULTS` is a normal empty answer, not an error.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use parcel_common::Coordinate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

/// Result types requested from the provider
pub const RESULT_TYPES: [&str; 2] = ["street_address", "premise"];

/// Geocoding errors
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("geocoder returned HTTP {0}")]
    Http(u16),

    /// Non-OK status in the response body (REQUEST_DENIED, OVER_QUERY_LIMIT...)
    #[error("geocoder status {status}: {message}")]
    Status { status: String, message: String },

    #[error("malformed geocoder response: {0}")]
    Parse(String),

    #[error("geocoder request timed out")]
    Timeout,
}

/// One address component (`long_name`, `short_name`, `types`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// Best reverse-geocode match for a point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub formatted_address: String,
    pub place_id: Option<String>,
    /// ROOFTOP, RANGE_INTERPOLATED, GEOMETRIC_CENTER or APPROXIMATE
    pub location_type: Option<String>,
    pub components: Vec<AddressComponent>,
}

#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// Street-level address at `coordinate`, `None` when there is none
    async fn reverse_geocode(&self, coordinate: &Coordinate) -> Result<Option<GeocodeResult>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<RawResult>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    formatted_address: String,
    #[serde(default)]
    place_id: Option<String>,
    #[serde(default)]
    geometry: Option<RawGeometry>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(default)]
    location_type: Option<String>,
}

/// HTTP geocoding client
pub struct HttpGeocodingProvider {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl HttpGeocodingProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(parcel_common::config::get_user_agent())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            rate_limiter: RateLimiter::direct(Quota::per_second(
                NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN),
            )),
        })
    }
}

#[async_trait]
impl GeocodingProvider for HttpGeocodingProvider {
    async fn reverse_geocode(&self, coordinate: &Coordinate) -> Result<Option<GeocodeResult>, GeocodeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/geocode/json", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                (
                    "latlng",
                    format!("{},{}", coordinate.latitude, coordinate.longitude),
                ),
                ("result_type", RESULT_TYPES.join("|")),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeocodeError::Timeout
                } else {
                    GeocodeError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Http(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GeocodeError::Network(e.to_string()))?;
        parse_geocode_response(&body)
    }
}

pub(crate) fn parse_geocode_response(body: &str) -> Result<Option<GeocodeResult>, GeocodeError> {
    let response: GeocodeResponse =
        serde_json::from_str(body).map_err(|e| GeocodeError::Parse(e.to_string()))?;

    match response.status.as_str() {
        "OK" => Ok(response.results.into_iter().next().map(|r| GeocodeResult {
            formatted_address: r.formatted_address,
            place_id: r.place_id,
            location_type: r.geometry.and_then(|g| g.location_type),
            components: r.address_components,
        })),
        "ZERO_RESULTS" => Ok(None),
        _ => Err(GeocodeError::Status {
            message: response.error_message.unwrap_or_default(),
            status: response.status,
        }),
    }
}
