//! Configuration for parcel-matcher
//!
//! Bootstrap configuration is read once from TOML at startup. Every section
//! has built-in defaults, so an absent file or a partial table is valid.
//!
//! # Sources Priority
//!
//! 1. `--config` command-line argument
//! 2. `PARCEL_MATCHER_CONFIG` environment variable
//! 3. `~/.config/parcel-matcher/config.toml`
//! 4. Built-in defaults
//!
//! Provider API keys additionally resolve Environment → TOML.

use parcel_common::config::{default_data_dir, env_secret, load_toml_config, resolve_config_path, LoggingConfig};
use parcel_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const APP_NAME: &str = "parcel-matcher";
pub const CONFIG_ENV_VAR: &str = "PARCEL_MATCHER_CONFIG";
pub const PARCEL_API_KEY_ENV_VAR: &str = "PARCEL_MATCHER_PARCEL_API_KEY";
pub const GEOCODING_API_KEY_ENV_VAR: &str = "PARCEL_MATCHER_GEOCODING_API_KEY";

/// Top-level bootstrap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub lookup: LookupConfig,

    #[serde(default)]
    pub geocoder: GeocoderConfig,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

fn default_database_path() -> PathBuf {
    default_data_dir(APP_NAME).join("parcels.db")
}

fn default_port() -> u16 {
    5731
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            port: default_port(),
            logging: LoggingConfig::default(),
            scoring: ScoringConfig::default(),
            cache: CacheConfig::default(),
            lookup: LookupConfig::default(),
            geocoder: GeocoderConfig::default(),
            pool: PoolConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

/// Spatial factor weights (must sum to 1.0)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialWeights {
    pub coordinate_delta: f64,
    pub distance: f64,
    pub bearing: f64,
    pub centeredness: f64,
}

impl Default for SpatialWeights {
    fn default() -> Self {
        Self {
            coordinate_delta: 0.50,
            distance: 0.35,
            bearing: 0.10,
            centeredness: 0.05,
        }
    }
}

impl SpatialWeights {
    fn sum(&self) -> f64 {
        self.coordinate_delta + self.distance + self.bearing + self.centeredness
    }
}

/// Metadata factor weights (must sum to 1.0)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataWeights {
    pub timestamp: f64,
    pub altitude: f64,
    pub orientation: f64,
}

impl Default for MetadataWeights {
    fn default() -> Self {
        Self {
            timestamp: 0.50,
            altitude: 0.30,
            orientation: 0.20,
        }
    }
}

impl MetadataWeights {
    fn sum(&self) -> f64 {
        self.timestamp + self.altitude + self.orientation
    }
}

/// Confidence scoring policy
///
/// The defaults reproduce the historical policy, which tolerates almost no
/// GPS noise. Operators can relax it here without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Euclidean degree distance allowed for the coordinate-delta check
    pub max_coordinate_delta_deg: f64,
    /// Distance allowed from the parcel reference point (meters)
    pub max_distance_m: f64,
    /// Allowed deviation from the reference heading (degrees, either side)
    pub bearing_tolerance_deg: f64,
    /// Heading used when the photo did not record one
    pub reference_heading_deg: f64,
    /// Oldest plausible capture time (days)
    pub max_photo_age_days: i64,
    /// Allowed altitude difference from the reference altitude (meters)
    pub altitude_tolerance_m: f64,
    /// Score given to the altitude check when either altitude is unknown
    pub unknown_altitude_score: f64,
    pub spatial_weights: SpatialWeights,
    pub metadata_weights: MetadataWeights,
    /// Share of the spatial category in the overall score
    pub spatial_share: f64,
    /// Share of the metadata category in the overall score
    pub metadata_share: f64,
    /// Minimum overall confidence for an automatic match
    pub acceptance_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_coordinate_delta_deg: 0.00008,
            max_distance_m: 15.0,
            bearing_tolerance_deg: 45.0,
            reference_heading_deg: 0.0,
            max_photo_age_days: 365,
            altitude_tolerance_m: 100.0,
            unknown_altitude_score: 0.5,
            spatial_weights: SpatialWeights::default(),
            metadata_weights: MetadataWeights::default(),
            spatial_share: 0.7,
            metadata_share: 0.3,
            acceptance_threshold: 0.99,
        }
    }
}

/// Parcel cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_hours: i64,
    /// Decimal places used to quantize cache keys
    pub key_precision: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            key_precision: 6,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours)
    }
}

/// Parcel lookup radius policy and retry behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Search radius in dense areas (meters)
    pub dense_radius_m: f64,
    /// Search radius in sparse areas (meters)
    pub sparse_radius_m: f64,
    /// Radius of the density probe (meters)
    pub density_probe_radius_m: f64,
    /// Nearby parcel count above which an area counts as dense
    pub density_threshold: u32,
    /// Maximum parcels requested by the density probe
    pub density_probe_limit: u32,
    /// Total attempts for transient provider failures
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            dense_radius_m: 50.0,
            sparse_radius_m: 20.0,
            density_probe_radius_m: 50.0,
            density_threshold: 3,
            density_probe_limit: 10,
            max_attempts: 3,
            initial_backoff_ms: 100,
        }
    }
}

/// Monte Carlo consensus geocoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub samples: usize,
    /// Pause between provider calls (milliseconds)
    pub throttle_ms: u64,
    /// GPS error radius used when the caller supplies no accuracy (meters)
    pub default_error_radius_m: f64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            samples: 100,
            throttle_ms: 100,
            default_error_radius_m: 15.0,
        }
    }
}

impl GeocoderConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

/// Batch worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Photos matched concurrently
    pub worker_count: usize,
    /// Simultaneous outbound parcel-provider calls
    pub provider_concurrency: usize,
    /// Per-photo pipeline timeout (seconds)
    pub photo_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            provider_concurrency: 2,
            photo_timeout_secs: 60,
        }
    }
}

impl PoolConfig {
    pub fn photo_timeout(&self) -> Duration {
        Duration::from_secs(self.photo_timeout_secs)
    }
}

/// External provider endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub parcel_base_url: String,
    pub parcel_api_key: Option<String>,
    pub geocoding_base_url: String,
    pub geocoding_api_key: Option<String>,
    /// Outbound request budget per provider
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            parcel_base_url: "https://app.regrid.com/api/v2".to_string(),
            parcel_api_key: None,
            geocoding_base_url: "https://maps.googleapis.com/maps/api".to_string(),
            geocoding_api_key: None,
            requests_per_second: 5,
            request_timeout_secs: 15,
        }
    }
}

impl MatcherConfig {
    /// Load configuration from the resolved TOML path, or defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let config = match resolve_config_path(cli_path, CONFIG_ENV_VAR, APP_NAME) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                load_toml_config::<MatcherConfig>(&path)?
            }
            None => {
                info!("No configuration file found, using built-in defaults");
                MatcherConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject weight tables and limits that cannot produce a 0-1 confidence
    pub fn validate(&self) -> Result<()> {
        let scoring = &self.scoring;
        let close_to_one = |v: f64| (v - 1.0).abs() < 1e-6;

        if !close_to_one(scoring.spatial_weights.sum()) {
            return Err(Error::Config(format!(
                "scoring.spatial_weights must sum to 1.0 (got {})",
                scoring.spatial_weights.sum()
            )));
        }
        if !close_to_one(scoring.metadata_weights.sum()) {
            return Err(Error::Config(format!(
                "scoring.metadata_weights must sum to 1.0 (got {})",
                scoring.metadata_weights.sum()
            )));
        }
        if !close_to_one(scoring.spatial_share + scoring.metadata_share) {
            return Err(Error::Config(format!(
                "scoring.spatial_share + scoring.metadata_share must equal 1.0 (got {})",
                scoring.spatial_share + scoring.metadata_share
            )));
        }
        if !(0.0..=1.0).contains(&scoring.acceptance_threshold) {
            return Err(Error::Config(format!(
                "scoring.acceptance_threshold out of range: {}",
                scoring.acceptance_threshold
            )));
        }
        if self.pool.worker_count == 0 || self.pool.provider_concurrency == 0 {
            return Err(Error::Config(
                "pool.worker_count and pool.provider_concurrency must be at least 1".to_string(),
            ));
        }
        if self.geocoder.samples == 0 {
            return Err(Error::Config("geocoder.samples must be at least 1".to_string()));
        }
        if self.lookup.max_attempts == 0 {
            return Err(Error::Config("lookup.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Parcel provider key (Environment → TOML)
    pub fn parcel_api_key(&self) -> Option<String> {
        resolve_api_key(
            "parcel provider",
            env_secret(PARCEL_API_KEY_ENV_VAR),
            self.providers.parcel_api_key.as_deref(),
        )
    }

    /// Geocoding provider key (Environment → TOML)
    pub fn geocoding_api_key(&self) -> Option<String> {
        resolve_api_key(
            "geocoding provider",
            env_secret(GEOCODING_API_KEY_ENV_VAR),
            self.providers.geocoding_api_key.as_deref(),
        )
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn resolve_api_key(label: &str, env_key: Option<String>, toml_key: Option<&str>) -> Option<String> {
    let toml_key = toml_key.filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "{} API key found in environment and TOML. Using environment (highest priority).",
            label
        );
    }

    if let Some(key) = env_key {
        info!("{} API key loaded from environment variable", label);
        return Some(key);
    }
    if let Some(key) = toml_key {
        info!("{} API key loaded from TOML config", label);
        return Some(key.to_string());
    }

    warn!("{} API key not configured", label);
    None
}
