//! Service modules for the matching pipeline
//!
//! Leaves first: cache and provider clients, then scoring, geocoding and
//! property resolution, then the orchestrator that drives them.

pub mod confidence_scorer;
pub mod consensus_geocoder;
pub mod geocoding;
pub mod http_parcel_provider;
pub mod match_orchestrator;
pub mod owner_classifier;
pub mod parcel_cache;
pub mod parcel_client;
pub mod property_resolver;

pub use confidence_scorer::{ConfidenceScorer, MetadataEvidence, SpatialEvidence};
pub use consensus_geocoder::{ConsensusGeocoder, ConsensusResult, GeocodeSample};
pub use geocoding::{GeocodeError, GeocodeResult, GeocodingProvider, HttpGeocodingProvider};
pub use http_parcel_provider::{HttpParcelProvider, UnconfiguredParcelProvider};
pub use match_orchestrator::MatchOrchestrator;
pub use owner_classifier::{KeywordOwnerClassifier, OwnerClassifier};
pub use parcel_cache::ParcelCache;
pub use parcel_client::{LookupFailure, ParcelLookupClient, ParcelProvider, ParcelQuery};
pub use property_resolver::PropertyResolver;
