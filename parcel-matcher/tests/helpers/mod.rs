//! Test Helper Utilities
//!
//! Shared utilities for testing parcel-matcher

#![allow(dead_code)]

pub mod db_utils;
pub mod mock_providers;

pub use db_utils::{count_live_properties, create_test_db, insert_photos, reload_photo};
pub use mock_providers::{fixture_parcel, FixedGeocoder, MockParcelProvider};

use parcel_matcher::config::MatcherConfig;
use parcel_matcher::services::{MatchOrchestrator, ParcelProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Configuration with retry and throttling delays shrunk for tests
pub fn test_config() -> MatcherConfig {
    let mut config = MatcherConfig::default();
    config.lookup.initial_backoff_ms = 1;
    config.geocoder.throttle_ms = 0;
    config.pool.photo_timeout_secs = 5;
    config
}

pub fn create_test_orchestrator(pool: &SqlitePool, provider: Arc<dyn ParcelProvider>) -> Arc<MatchOrchestrator> {
    Arc::new(MatchOrchestrator::from_config(pool.clone(), &test_config(), provider))
}
