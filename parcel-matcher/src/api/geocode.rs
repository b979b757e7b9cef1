//! Consensus geocoding endpoint

use axum::{extract::State, routing::post, Json, Router};
use parcel_common::geometry::validate_coordinate;
use parcel_common::RawDegrees;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::services::ConsensusResult;
use crate::AppState;

/// Body of `POST /geocode/consensus`
#[derive(Debug, Deserialize)]
pub struct ConsensusRequest {
    pub latitude: RawDegrees,
    pub longitude: RawDegrees,
    /// Device-reported GPS accuracy (meters)
    pub accuracy_m: Option<f64>,
    /// Known address to check the consensus against
    pub expected_address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConsensusResponse {
    #[serde(flatten)]
    pub result: ConsensusResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_verified: Option<bool>,
}

/// POST /geocode/consensus
pub async fn consensus_geocode(
    State(state): State<AppState>,
    Json(request): Json<ConsensusRequest>,
) -> ApiResult<Json<ConsensusResponse>> {
    let geocoder = state
        .geocoder
        .clone()
        .ok_or_else(|| ApiError::Unavailable("geocoding provider not configured".to_string()))?;

    let origin = validate_coordinate(request.latitude, request.longitude)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let result = geocoder.geocode(&origin, request.accuracy_m).await;
    let address_verified = request
        .expected_address
        .as_deref()
        .map(|expected| result.verify_address(expected));

    Ok(Json(ConsensusResponse {
        result,
        address_verified,
    }))
}

/// Build geocoding routes
pub fn geocode_routes() -> Router<AppState> {
    Router::new().route("/geocode/consensus", post(consensus_geocode))
}
