//! HTTP land-records provider
//!
//! Point queries against a Regrid-style parcel API returning a GeoJSON
//! FeatureCollection. Outbound requests are rate limited per client.

use super::parcel_client::{LookupFailure, ParcelProvider, ParcelQuery};
use crate::models::{ParcelAddress, ParcelRecord, Valuation};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use parcel_common::geometry::validate_coordinate;
use parcel_common::{Coordinate, ParcelBoundary, PolygonRings, RawDegrees};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: FeatureProperties,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: serde_json::Value,
}

/// Parcel attributes; numeric fields may arrive as strings
#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    #[serde(alias = "parcel_number")]
    parcelnumb: Option<String>,
    address: Option<String>,
    scity: Option<String>,
    #[serde(alias = "state")]
    state2: Option<String>,
    szip: Option<String>,
    owner: Option<String>,
    mailadd: Option<String>,
    yearbuilt: Option<RawDegrees>,
    parval: Option<RawDegrees>,
    improvval: Option<RawDegrees>,
    landval: Option<RawDegrees>,
    zoning: Option<String>,
    lat: Option<RawDegrees>,
    lon: Option<RawDegrees>,
}

/// Regrid-style parcel API client
pub struct HttpParcelProvider {
    client: Client,
    base_url: String,
    api_key: String,
    user_agent: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl HttpParcelProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        let rate_limiter = RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN),
        ));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            user_agent: parcel_common::config::get_user_agent(),
            rate_limiter,
        })
    }

    /// Raw FeatureCollection body for `query`
    async fn request(&self, query: &ParcelQuery) -> Result<String, LookupFailure> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/parcels/point", self.base_url);
        tracing::debug!(
            lat = query.coordinate.latitude,
            lon = query.coordinate.longitude,
            radius_m = query.radius_m,
            limit = query.limit,
            "Querying parcel provider"
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("User-Agent", &self.user_agent)
            .query(&[
                ("lat", query.coordinate.latitude.to_string()),
                ("lon", query.coordinate.longitude.to_string()),
                ("radius", query.radius_m.to_string()),
                ("return_geometry", query.return_geometry.to_string()),
                ("return_zoning", query.return_zoning.to_string()),
                ("limit", query.limit.to_string()),
            ])
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LookupFailure::RateLimited);
        }
        let body = response.text().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(LookupFailure::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl ParcelProvider for HttpParcelProvider {
    async fn fetch_parcels(&self, query: &ParcelQuery) -> Result<Vec<ParcelRecord>, LookupFailure> {
        parse_feature_collection(&self.request(query).await?)
    }

    async fn count_parcels(&self, query: &ParcelQuery) -> Result<u32, LookupFailure> {
        count_features(&self.request(query).await?)
    }
}

/// Stand-in used when no parcel API key is configured
///
/// Every lookup fails permanently, so photos with coordinates are recorded
/// as errors instead of silently staying unassigned.
pub struct UnconfiguredParcelProvider;

#[async_trait]
impl ParcelProvider for UnconfiguredParcelProvider {
    async fn fetch_parcels(&self, _query: &ParcelQuery) -> Result<Vec<ParcelRecord>, LookupFailure> {
        Err(LookupFailure::Api {
            status: 401,
            body: "parcel provider API key not configured".to_string(),
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> LookupFailure {
    if err.is_timeout() {
        LookupFailure::Timeout
    } else {
        LookupFailure::Network(err.to_string())
    }
}

/// Number of features in a FeatureCollection body
///
/// Density probes skip geometry, so features are counted whether or not
/// they carry a usable position.
pub(crate) fn count_features(body: &str) -> Result<u32, LookupFailure> {
    #[derive(Deserialize)]
    struct Features {
        #[serde(default)]
        features: Vec<serde::de::IgnoredAny>,
    }
    let collection: Features =
        serde_json::from_str(body).map_err(|e| LookupFailure::Parse(e.to_string()))?;
    Ok(u32::try_from(collection.features.len()).unwrap_or(u32::MAX))
}

/// Map a FeatureCollection body to parcel records, in provider order
///
/// Features without a parcel number or without any usable position are skipped.
pub(crate) fn parse_feature_collection(body: &str) -> Result<Vec<ParcelRecord>, LookupFailure> {
    let collection: FeatureCollection =
        serde_json::from_str(body).map_err(|e| LookupFailure::Parse(e.to_string()))?;

    let mut parcels = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let boundary = match &feature.geometry {
            Some(geometry) => parse_boundary(geometry)?,
            None => None,
        };
        match parcel_from_feature(feature.properties, boundary) {
            Some(parcel) => parcels.push(parcel),
            None => tracing::debug!("Skipping provider feature without parcel number or position"),
        }
    }
    Ok(parcels)
}

fn parse_boundary(geometry: &Geometry) -> Result<Option<ParcelBoundary>, LookupFailure> {
    type Ring = Vec<[f64; 2]>;
    let members: Vec<Vec<Ring>> = match geometry.kind.as_str() {
        "Polygon" => vec![serde_json::from_value(geometry.coordinates.clone())
            .map_err(|e| LookupFailure::Parse(format!("polygon coordinates: {}", e)))?],
        "MultiPolygon" => serde_json::from_value(geometry.coordinates.clone())
            .map_err(|e| LookupFailure::Parse(format!("multipolygon coordinates: {}", e)))?,
        _ => return Ok(None),
    };

    let polygons: Vec<PolygonRings> = members
        .into_iter()
        .filter_map(|rings| {
            let mut rings = rings.into_iter();
            let exterior = rings.next()?;
            Some(PolygonRings {
                exterior,
                holes: rings.collect(),
            })
        })
        .collect();
    if polygons.is_empty() {
        return Ok(None);
    }
    Ok(Some(ParcelBoundary { polygons }))
}

fn number(value: Option<RawDegrees>) -> Option<f64> {
    match value? {
        RawDegrees::Number(n) if n.is_finite() => Some(n),
        RawDegrees::Number(_) => None,
        RawDegrees::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parcel_from_feature(
    props: FeatureProperties,
    boundary: Option<ParcelBoundary>,
) -> Option<ParcelRecord> {
    let parcel_number = non_empty(props.parcelnumb)?;

    let reported = match (props.lat, props.lon) {
        (Some(lat), Some(lon)) => validate_coordinate(lat, lon).ok(),
        _ => None,
    };
    let reference_point: Coordinate = reported.or_else(|| {
        boundary
            .as_ref()
            .and_then(|b| b.bounding_box())
            .map(|bbox| bbox.center())
    })?;

    Some(ParcelRecord {
        parcel_number,
        reference_point,
        address: ParcelAddress {
            line: non_empty(props.address),
            city: non_empty(props.scity),
            state: non_empty(props.state2),
            postal_code: non_empty(props.szip),
        },
        owner_name: non_empty(props.owner),
        owner_mailing_address: non_empty(props.mailadd),
        year_built: number(props.yearbuilt)
            .filter(|y| *y > 0.0)
            .map(|y| y as i32),
        valuation: Valuation {
            total: number(props.parval),
            improvements: number(props.improvval),
            land: number(props.landval),
        },
        zoning: non_empty(props.zoning),
        boundary,
        nearby_parcel_count: None,
    })
}
