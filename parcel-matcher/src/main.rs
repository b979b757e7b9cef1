//! parcel-matcher - Photo to Parcel Matching Service
//!
//! Matches geotagged photos to land parcels and the properties built on
//! them, and answers consensus reverse-geocoding requests.

use anyhow::Result;
use clap::Parser;
use parcel_common::db::init_database;
use parcel_matcher::config::MatcherConfig;
use parcel_matcher::services::{
    ConsensusGeocoder, HttpGeocodingProvider, HttpParcelProvider, MatchOrchestrator, ParcelProvider,
    UnconfiguredParcelProvider,
};
use parcel_matcher::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "parcel-matcher", version, about = "Photo to parcel matching service")]
struct Args {
    /// Path to TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The subscriber depends on the logging section; messages emitted while
    // loading it are not recorded.
    let config = MatcherConfig::load(args.config.as_deref());
    let (level, json) = match &config {
        Ok(c) => (c.logging.level.clone(), c.logging.json),
        Err(_) => ("info".to_string(), false),
    };
    init_tracing(&level, json)?;
    let config = config?;

    info!("Starting parcel-matcher");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let db_pool = init_database(&config.database_path).await?;
    info!("Database connection established");

    let timeout = Duration::from_secs(config.providers.request_timeout_secs);
    let rps = config.providers.requests_per_second;

    let parcel_provider: Arc<dyn ParcelProvider> = match config.parcel_api_key() {
        Some(key) => Arc::new(HttpParcelProvider::new(
            config.providers.parcel_base_url.clone(),
            key,
            rps,
            timeout,
        )?),
        None => {
            warn!("Parcel lookups will fail until a parcel provider API key is configured");
            Arc::new(UnconfiguredParcelProvider)
        }
    };

    let geocoder = match config.geocoding_api_key() {
        Some(key) => {
            let provider = HttpGeocodingProvider::new(
                config.providers.geocoding_base_url.clone(),
                key,
                rps,
                timeout,
            )?;
            Some(Arc::new(ConsensusGeocoder::new(
                Arc::new(provider),
                config.geocoder.clone(),
            )))
        }
        None => {
            warn!("Consensus geocoding disabled: no geocoding provider API key");
            None
        }
    };

    let orchestrator = Arc::new(MatchOrchestrator::from_config(
        db_pool.clone(),
        &config,
        parcel_provider,
    ));
    let cancel_token = orchestrator.cancellation_token();

    let state = AppState::new(db_pool, orchestrator, geocoder);
    let app = parcel_matcher::build_router(state);

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutdown requested, cancelling in-flight batches");
            cancel_token.cancel();
        })
        .await?;

    info!("parcel-matcher stopped");
    Ok(())
}
