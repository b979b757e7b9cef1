//! Photo matching endpoints
//!
//! - `POST /photos/:id/process` runs one photo
//! - `POST /photos/process-pending` runs every pending photo
//! - `POST /photos/revalidate` re-checks automatic assignments
//! - `POST /photos/:id/assign` operator assignment to an existing property
//! - `GET /photos/unassigned` lists photos without a property
//!
//! Batch runs are exclusive; a second concurrent request gets 409.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, PipelineError};
use crate::models::{BatchSummary, MatchResult, PhotoRecord};
use crate::AppState;

/// Body of `POST /photos/:id/assign`
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub property_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct UnassignedResponse {
    pub count: usize,
    pub photos: Vec<PhotoRecord>,
}

async fn surface<T>(state: &AppState, result: Result<T, PipelineError>) -> ApiResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            if matches!(e, PipelineError::Persistence(_)) {
                state.record_error(e.to_string()).await;
            }
            Err(ApiError::Pipeline(e))
        }
    }
}

/// POST /photos/:id/process
pub async fn process_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<Uuid>,
) -> ApiResult<Json<MatchResult>> {
    let result = state.orchestrator.process_photo(photo_id).await;
    Ok(Json(surface(&state, result).await?))
}

/// POST /photos/process-pending
pub async fn process_pending(State(state): State<AppState>) -> ApiResult<Json<BatchSummary>> {
    let _batch = state
        .batch_lock
        .try_lock()
        .map_err(|_| ApiError::Conflict("a batch run is already in progress".to_string()))?;

    let result = state.orchestrator.process_pending_photos().await;
    Ok(Json(surface(&state, result).await?))
}

/// POST /photos/revalidate
pub async fn revalidate(State(state): State<AppState>) -> ApiResult<Json<BatchSummary>> {
    let _batch = state
        .batch_lock
        .try_lock()
        .map_err(|_| ApiError::Conflict("a batch run is already in progress".to_string()))?;

    let result = state.orchestrator.revalidate_photo_assignments().await;
    Ok(Json(surface(&state, result).await?))
}

/// POST /photos/:id/assign
pub async fn assign_photo(
    State(state): State<AppState>,
    Path(photo_id): Path<Uuid>,
    Json(request): Json<AssignRequest>,
) -> ApiResult<Json<MatchResult>> {
    let result = state
        .orchestrator
        .manually_assign_photo(photo_id, request.property_id)
        .await;
    Ok(Json(surface(&state, result).await?))
}

/// GET /photos/unassigned
pub async fn unassigned_photos(State(state): State<AppState>) -> ApiResult<Json<UnassignedResponse>> {
    let result = state.orchestrator.get_unassigned_photos().await;
    let photos = surface(&state, result).await?;
    Ok(Json(UnassignedResponse {
        count: photos.len(),
        photos,
    }))
}

/// Build photo routes
pub fn photo_routes() -> Router<AppState> {
    Router::new()
        .route("/photos/process-pending", post(process_pending))
        .route("/photos/revalidate", post(revalidate))
        .route("/photos/unassigned", get(unassigned_photos))
        .route("/photos/:id/process", post(process_photo))
        .route("/photos/:id/assign", post(assign_photo))
}
