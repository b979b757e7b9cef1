//! parcel-matcher library interface
//!
//! Exposes the matching engine and its HTTP surface for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, PipelineError};

use axum::Router;
use chrono::{DateTime, Utc};
use services::{ConsensusGeocoder, MatchOrchestrator};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub orchestrator: Arc<MatchOrchestrator>,
    /// `None` when no geocoding key is configured
    pub geocoder: Option<Arc<ConsensusGeocoder>>,
    /// Held for the duration of a batch run; one batch at a time
    pub batch_lock: Arc<Mutex<()>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        orchestrator: Arc<MatchOrchestrator>,
        geocoder: Option<Arc<ConsensusGeocoder>>,
    ) -> Self {
        Self {
            db,
            orchestrator,
            geocoder,
            batch_lock: Arc::new(Mutex::new(())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::photo_routes())
        .merge(api::geocode_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
