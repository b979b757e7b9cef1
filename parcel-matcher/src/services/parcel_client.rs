//! Parcel lookup client
//!
//! Wraps a [`ParcelProvider`] with the radius policy, the shared outbound
//! permit pool and retry of transient failures. "No parcel here" is
//! `Ok(None)`; only provider trouble is a [`LookupFailure`].

use crate::config::LookupConfig;
use crate::models::ParcelRecord;
use crate::utils::retry::{retry_transient, RetryPolicy, Transient};
use async_trait::async_trait;
use parcel_common::Coordinate;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Provider-side failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LookupFailure {
    #[error("network error: {0}")]
    Network(String),

    #[error("provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Parse(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("provider request timed out")]
    Timeout,
}

impl Transient for LookupFailure {
    fn is_transient(&self) -> bool {
        match self {
            LookupFailure::Network(_) | LookupFailure::Timeout | LookupFailure::RateLimited => true,
            LookupFailure::Api { status, .. } => *status == 429 || *status >= 500,
            LookupFailure::Parse(_) => false,
        }
    }
}

/// Point query sent to the provider
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelQuery {
    pub coordinate: Coordinate,
    pub radius_m: f64,
    pub return_geometry: bool,
    pub return_zoning: bool,
    pub limit: u32,
}

/// Source of parcel records
///
/// Implementations return parcels nearest-first and an empty vector when
/// nothing lies within the radius.
#[async_trait]
pub trait ParcelProvider: Send + Sync {
    async fn fetch_parcels(&self, query: &ParcelQuery) -> Result<Vec<ParcelRecord>, LookupFailure>;

    /// Parcels the provider reports for `query`, usable position or not
    async fn count_parcels(&self, query: &ParcelQuery) -> Result<u32, LookupFailure> {
        let parcels = self.fetch_parcels(query).await?;
        Ok(u32::try_from(parcels.len()).unwrap_or(u32::MAX))
    }
}

/// Density-aware lookup client shared by all workers
pub struct ParcelLookupClient {
    provider: Arc<dyn ParcelProvider>,
    permits: Arc<Semaphore>,
    policy: LookupConfig,
    retry: RetryPolicy,
}

impl ParcelLookupClient {
    pub fn new(provider: Arc<dyn ParcelProvider>, policy: LookupConfig, provider_concurrency: usize) -> Self {
        let retry = RetryPolicy::new(
            policy.max_attempts,
            Duration::from_millis(policy.initial_backoff_ms),
        );
        Self {
            provider,
            permits: Arc::new(Semaphore::new(provider_concurrency.max(1))),
            policy,
            retry,
        }
    }

    /// Parcels within the probe radius (at most the probe limit)
    pub async fn density_hint(&self, coordinate: &Coordinate) -> Result<u32, LookupFailure> {
        let query = ParcelQuery {
            coordinate: *coordinate,
            radius_m: self.policy.density_probe_radius_m,
            return_geometry: false,
            return_zoning: false,
            limit: self.policy.density_probe_limit,
        };
        self.count("density probe", &query).await
    }

    /// Search radius for a given nearby-parcel count
    pub fn search_radius(&self, density: u32) -> f64 {
        if density > self.policy.density_threshold {
            self.policy.dense_radius_m
        } else {
            self.policy.sparse_radius_m
        }
    }

    /// Nearest parcel within `radius_m`
    ///
    /// With `want_density_hint` the density probe runs first and its count is
    /// attached to the returned record.
    pub async fn lookup(
        &self,
        coordinate: &Coordinate,
        radius_m: f64,
        want_density_hint: bool,
    ) -> Result<Option<ParcelRecord>, LookupFailure> {
        let density = if want_density_hint {
            Some(self.density_hint(coordinate).await?)
        } else {
            None
        };
        self.nearest(coordinate, radius_m, density).await
    }

    /// Density probe, then a lookup with the radius that density calls for
    pub async fn lookup_adaptive(
        &self,
        coordinate: &Coordinate,
    ) -> Result<Option<ParcelRecord>, LookupFailure> {
        let density = self.density_hint(coordinate).await?;
        let radius_m = self.search_radius(density);
        tracing::debug!(
            coordinate = %coordinate,
            density,
            radius_m,
            "Parcel search radius selected"
        );
        self.nearest(coordinate, radius_m, Some(density)).await
    }

    async fn nearest(
        &self,
        coordinate: &Coordinate,
        radius_m: f64,
        density: Option<u32>,
    ) -> Result<Option<ParcelRecord>, LookupFailure> {
        let query = ParcelQuery {
            coordinate: *coordinate,
            radius_m,
            return_geometry: true,
            return_zoning: true,
            limit: 1,
        };
        let parcel = self.fetch("parcel lookup", &query).await?.into_iter().next();
        Ok(parcel.map(|mut parcel| {
            if density.is_some() {
                parcel.nearby_parcel_count = density;
            }
            parcel
        }))
    }

    async fn fetch(&self, operation: &str, query: &ParcelQuery) -> Result<Vec<ParcelRecord>, LookupFailure> {
        retry_transient(operation, self.retry, || async move {
            let _permit = self.permit().await?;
            self.provider.fetch_parcels(query).await
        })
        .await
    }

    async fn count(&self, operation: &str, query: &ParcelQuery) -> Result<u32, LookupFailure> {
        retry_transient(operation, self.retry, || async move {
            let _permit = self.permit().await?;
            self.provider.count_parcels(query).await
        })
        .await
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>, LookupFailure> {
        self.permits
            .acquire()
            .await
            .map_err(|_| LookupFailure::Network("provider permit pool closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParcelAddress, Valuation};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Pops one scripted response per call; records every query
    struct ScriptedProvider {
        responses: Mutex<Vec<Result<Vec<ParcelRecord>, LookupFailure>>>,
        queries: Mutex<Vec<ParcelQuery>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<Result<Vec<ParcelRecord>, LookupFailure>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                queries: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn queries(&self) -> Vec<ParcelQuery> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ParcelProvider for ScriptedProvider {
        async fn fetch_parcels(&self, query: &ParcelQuery) -> Result<Vec<ParcelRecord>, LookupFailure> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.queries.lock().unwrap().push(query.clone());
            self.responses.lock().unwrap().pop().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn parcel(number: &str) -> ParcelRecord {
        ParcelRecord {
            parcel_number: number.to_string(),
            reference_point: Coordinate::new(40.0, -75.0),
            address: ParcelAddress::default(),
            owner_name: None,
            owner_mailing_address: None,
            year_built: None,
            valuation: Valuation::default(),
            zoning: None,
            boundary: None,
            nearby_parcel_count: None,
        }
    }

    fn parcels(n: usize) -> Vec<ParcelRecord> {
        (0..n).map(|i| parcel(&format!("P{}", i))).collect()
    }

    fn fast_policy() -> LookupConfig {
        LookupConfig {
            initial_backoff_ms: 1,
            ..LookupConfig::default()
        }
    }

    fn client(provider: Arc<ScriptedProvider>) -> ParcelLookupClient {
        ParcelLookupClient::new(provider, fast_policy(), 2)
    }

    #[test]
    fn test_transient_classification() {
        assert!(LookupFailure::Timeout.is_transient());
        assert!(LookupFailure::RateLimited.is_transient());
        assert!(LookupFailure::Network("reset".into()).is_transient());
        assert!(LookupFailure::Api { status: 503, body: String::new() }.is_transient());
        assert!(LookupFailure::Api { status: 429, body: String::new() }.is_transient());
        assert!(!LookupFailure::Api { status: 401, body: String::new() }.is_transient());
        assert!(!LookupFailure::Parse("bad json".into()).is_transient());
    }

    #[test]
    fn test_search_radius_policy() {
        let client = client(Arc::new(ScriptedProvider::new(vec![])));
        assert_eq!(client.search_radius(0), 20.0);
        assert_eq!(client.search_radius(3), 20.0);
        assert_eq!(client.search_radius(4), 50.0);
        assert_eq!(client.search_radius(10), 50.0);
    }

    #[tokio::test]
    async fn test_density_hint_counts_probe_results() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(parcels(5))]));
        let client = client(provider.clone());

        let density = client.density_hint(&Coordinate::new(40.0, -75.0)).await.unwrap();
        assert_eq!(density, 5);

        let queries = provider.queries();
        assert_eq!(queries[0].radius_m, 50.0);
        assert_eq!(queries[0].limit, 10);
        assert!(!queries[0].return_geometry);
    }

    #[tokio::test]
    async fn test_adaptive_lookup_uses_dense_radius() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(parcels(6)), Ok(vec![parcel("HIT")])]));
        let client = client(provider.clone());

        let found = client
            .lookup_adaptive(&Coordinate::new(40.0, -75.0))
            .await
            .unwrap()
            .expect("parcel expected");
        assert_eq!(found.parcel_number, "HIT");
        assert_eq!(found.nearby_parcel_count, Some(6));

        let queries = provider.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1].radius_m, 50.0);
        assert!(queries[1].return_geometry && queries[1].return_zoning);
        assert_eq!(queries[1].limit, 1);
    }

    /// Reports parcels to the density probe that it cannot return as records
    struct CountOnlyProvider {
        count: u32,
        radii: Mutex<Vec<f64>>,
    }

    #[async_trait]
    impl ParcelProvider for CountOnlyProvider {
        async fn fetch_parcels(&self, query: &ParcelQuery) -> Result<Vec<ParcelRecord>, LookupFailure> {
            self.radii.lock().unwrap().push(query.radius_m);
            Ok(Vec::new())
        }

        async fn count_parcels(&self, _query: &ParcelQuery) -> Result<u32, LookupFailure> {
            Ok(self.count)
        }
    }

    #[tokio::test]
    async fn test_density_uses_provider_count() {
        let provider = Arc::new(CountOnlyProvider {
            count: 5,
            radii: Mutex::new(Vec::new()),
        });
        let client = ParcelLookupClient::new(provider.clone(), fast_policy(), 2);

        assert_eq!(client.density_hint(&Coordinate::new(40.0, -75.0)).await.unwrap(), 5);
        client.lookup_adaptive(&Coordinate::new(40.0, -75.0)).await.unwrap();
        assert_eq!(*provider.radii.lock().unwrap(), vec![50.0]);
    }

    #[tokio::test]
    async fn test_adaptive_lookup_uses_sparse_radius() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(parcels(1)), Ok(vec![parcel("HIT")])]));
        let client = client(provider.clone());

        client.lookup_adaptive(&Coordinate::new(40.0, -75.0)).await.unwrap();
        assert_eq!(provider.queries()[1].radius_m, 20.0);
    }

    #[tokio::test]
    async fn test_zero_results_is_none() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(vec![])]));
        let client = client(provider);

        let found = client.lookup(&Coordinate::new(0.0, 0.0), 20.0, false).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(LookupFailure::Timeout),
            Err(LookupFailure::Api { status: 502, body: "bad gateway".into() }),
            Ok(vec![parcel("HIT")]),
        ]));
        let client = client(provider.clone());

        let found = client.lookup(&Coordinate::new(40.0, -75.0), 20.0, false).await.unwrap();
        assert_eq!(found.map(|p| p.parcel_number), Some("HIT".to_string()));
        assert_eq!(provider.queries().len(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_last_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(LookupFailure::Timeout),
            Err(LookupFailure::Timeout),
            Err(LookupFailure::Timeout),
            Ok(vec![parcel("TOO-LATE")]),
        ]));
        let client = client(provider.clone());

        let err = client
            .lookup(&Coordinate::new(40.0, -75.0), 20.0, false)
            .await
            .unwrap_err();
        assert_eq!(err, LookupFailure::Timeout);
        assert_eq!(provider.queries().len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(LookupFailure::Api {
            status: 403,
            body: "forbidden".into(),
        })]));
        let client = client(provider.clone());

        let err = client
            .lookup(&Coordinate::new(40.0, -75.0), 20.0, false)
            .await
            .unwrap_err();
        assert!(matches!(err, LookupFailure::Api { status: 403, .. }));
        assert_eq!(provider.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_concurrency_is_capped() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let client = Arc::new(client(provider.clone()));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let client = client.clone();
            tasks.spawn(async move {
                client
                    .lookup(&Coordinate::new(40.0 + i as f64 * 0.001, -75.0), 20.0, false)
                    .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(provider.queries().len(), 8);
    }
}
