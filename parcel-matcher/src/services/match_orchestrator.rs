//! Match Orchestrator
//!
//! Drives photos through the matching pipeline and persists each outcome.
//!
//! # Pipeline (per photo)
//! 1. Validate coordinates (absent or invalid ⇒ unassigned, no provider calls)
//! 2. Parcel from cache, else density probe + lookup with the adjusted radius
//! 3. No parcel ⇒ `no_parcel_data`
//! 4. Boundary containment ⇒ else `coordinate_outside_parcel`
//! 5. Confidence score ⇒ below threshold `low_confidence`
//! 6. Resolve the property and record the match
//!
//! Steps 1-5 run under the per-photo timeout. Step 6 writes the property row
//! and is not interrupted.
//!
//! The photo is marked `processing` while in flight and always leaves that
//! state: matches become `processed`, unassigned outcomes return to `pending`,
//! provider failures and timeouts become `error`.
//!
//! # Batches
//! Photos run on a bounded worker pool (`buffer_unordered`), each under its
//! own timeout. One photo's failure never aborts the batch. After
//! cancellation, photos that have not started are skipped.

use crate::config::{MatcherConfig, PoolConfig};
use crate::db::{photos, properties};
use crate::error::PipelineError;
use crate::models::{
    BatchSummary, ConfidenceBreakdown, MatchMetadata, MatchMethod, MatchOutcome, MatchResult,
    ParcelRecord, PhotoRecord, ProcessingStatus, PropertyRecord,
};
use crate::services::confidence_scorer::{ConfidenceScorer, MetadataEvidence, SpatialEvidence};
use crate::services::owner_classifier::KeywordOwnerClassifier;
use crate::services::parcel_cache::ParcelCache;
use crate::services::parcel_client::{ParcelLookupClient, ParcelProvider};
use crate::services::property_resolver::PropertyResolver;
use futures::stream::{self, StreamExt};
use parcel_common::geometry::{point_in_polygon, validate_coordinate};
use parcel_common::Coordinate;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Result of the read-only part of the pipeline
enum Evaluation {
    Decided(MatchOutcome),
    /// Passed every gate; the property still has to be resolved
    Accepted {
        parcel: ParcelRecord,
        factors: ConfidenceBreakdown,
    },
}

pub struct MatchOrchestrator {
    db: SqlitePool,
    cache: Arc<ParcelCache>,
    lookup: ParcelLookupClient,
    scorer: ConfidenceScorer,
    resolver: PropertyResolver,
    pool: PoolConfig,
    cancel_token: CancellationToken,
}

impl MatchOrchestrator {
    pub fn new(
        db: SqlitePool,
        cache: Arc<ParcelCache>,
        lookup: ParcelLookupClient,
        scorer: ConfidenceScorer,
        resolver: PropertyResolver,
        pool: PoolConfig,
    ) -> Self {
        Self {
            db,
            cache,
            lookup,
            scorer,
            resolver,
            pool,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Wire every component from bootstrap configuration
    pub fn from_config(db: SqlitePool, config: &MatcherConfig, provider: Arc<dyn ParcelProvider>) -> Self {
        let cache = Arc::new(ParcelCache::new(config.cache.ttl(), config.cache.key_precision));
        let lookup = ParcelLookupClient::new(
            provider,
            config.lookup.clone(),
            config.pool.provider_concurrency,
        );
        let scorer = ConfidenceScorer::new(config.scoring.clone());
        let resolver = PropertyResolver::new(db.clone(), Arc::new(KeywordOwnerClassifier::default()));
        Self::new(db, cache, lookup, scorer, resolver, config.pool.clone())
    }

    pub fn cache(&self) -> &Arc<ParcelCache> {
        &self.cache
    }

    /// Token that stops batch runs from starting further photos
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Run one photo through the pipeline and persist the outcome
    ///
    /// Provider failures and timeouts are recorded on the photo and returned as
    /// an `Error` outcome. Persistence failures restore the prior status where
    /// possible and are returned as errors.
    pub async fn process_photo(&self, photo_id: Uuid) -> Result<MatchResult, PipelineError> {
        if self.cancel_token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let photo = photos::load_photo(&self.db, photo_id)
            .await?
            .ok_or(PipelineError::PhotoNotFound(photo_id))?;
        self.process_record(photo).await
    }

    /// Process every `pending` photo
    pub async fn process_pending_photos(&self) -> Result<BatchSummary, PipelineError> {
        let pending = photos::load_photos_by_status(&self.db, ProcessingStatus::Pending).await?;
        Ok(self.run_batch("process_pending", pending).await)
    }

    /// Re-run the pipeline for automatic assignments
    ///
    /// Operator assignments are left alone.
    pub async fn revalidate_photo_assignments(&self) -> Result<BatchSummary, PipelineError> {
        let assigned: Vec<PhotoRecord> = photos::load_assigned_photos(&self.db)
            .await?
            .into_iter()
            .filter(|photo| !photo.is_manual_assignment())
            .collect();
        Ok(self.run_batch("revalidate", assigned).await)
    }

    /// Operator override: assign `photo_id` to an existing live property
    ///
    /// Confidence is computed against the property coordinate for the audit
    /// trail but never blocks the assignment.
    pub async fn manually_assign_photo(
        &self,
        photo_id: Uuid,
        property_id: Uuid,
    ) -> Result<MatchResult, PipelineError> {
        let photo = photos::load_photo(&self.db, photo_id)
            .await?
            .ok_or(PipelineError::PhotoNotFound(photo_id))?;
        let property = properties::load_property(&self.db, property_id)
            .await?
            .filter(|p| !p.deleted)
            .ok_or(PipelineError::PropertyNotFound(property_id))?;

        let factors = match photo_coordinate(&photo) {
            Some(coordinate) => {
                let parcel = self.cached_parcel_for(&coordinate, &property);
                self.score(&photo, &coordinate, &property_point(&property), parcel.as_ref())
                    .await?
            }
            None => ConfidenceBreakdown {
                spatial_score: 0.0,
                metadata_score: None,
                overall: 0.0,
                threshold: self.scorer.threshold(),
                spatial: Vec::new(),
                metadata: Vec::new(),
            },
        };

        let outcome = MatchOutcome::Matched {
            property_id,
            confidence: factors.overall,
            method: MatchMethod::ManualAssignment,
            parcel_number: property.parcel_number.clone(),
            factors,
        };
        self.persist(&photo, &outcome).await?;

        tracing::info!(
            photo_id = %photo_id,
            property_id = %property_id,
            method = MatchMethod::ManualAssignment.as_str(),
            "Photo manually assigned"
        );
        Ok(MatchResult { photo_id, outcome })
    }

    /// Photos without a property that are not currently being processed
    pub async fn get_unassigned_photos(&self) -> Result<Vec<PhotoRecord>, PipelineError> {
        Ok(photos::load_unassigned_photos(&self.db).await?)
    }

    async fn run_batch(&self, label: &str, batch: Vec<PhotoRecord>) -> BatchSummary {
        let total = batch.len();
        let skipped = AtomicUsize::new(0);

        tracing::info!(
            batch = label,
            photos = total,
            workers = self.pool.worker_count,
            "Starting batch"
        );

        let results: Vec<MatchResult> = stream::iter(batch)
            .map(|photo| {
                let skipped = &skipped;
                async move {
                    if self.cancel_token.is_cancelled() {
                        skipped.fetch_add(1, Ordering::Relaxed);
                        return None;
                    }
                    let photo_id = photo.id;
                    match self.process_record(photo).await {
                        Ok(result) => Some(result),
                        Err(e) => {
                            tracing::error!(photo_id = %photo_id, error = %e, "Photo processing failed");
                            Some(MatchResult {
                                photo_id,
                                outcome: MatchOutcome::Error {
                                    message: e.to_string(),
                                },
                            })
                        }
                    }
                }
            })
            .buffer_unordered(self.pool.worker_count.max(1))
            .filter_map(|result| async move { result })
            .collect()
            .await;

        let summary = BatchSummary::from_results(results).with_skipped(skipped.into_inner());
        tracing::info!(
            batch = label,
            total = summary.total,
            matched = summary.matched,
            skipped = summary.skipped,
            "Batch complete"
        );
        summary
    }

    async fn process_record(&self, photo: PhotoRecord) -> Result<MatchResult, PipelineError> {
        let prior_status = photo.processing_status;
        photos::set_status(&self.db, photo.id, ProcessingStatus::Processing).await?;

        let timeout = self.pool.photo_timeout();
        let outcome = match tokio::time::timeout(timeout, self.evaluate(&photo)).await {
            Ok(Ok(Evaluation::Decided(outcome))) => outcome,
            // Runs outside the per-photo timeout
            Ok(Ok(Evaluation::Accepted { parcel, factors })) => {
                match self.resolver.resolve(&parcel).await {
                    Ok(property_id) => MatchOutcome::Matched {
                        property_id,
                        confidence: factors.overall,
                        method: MatchMethod::ParcelMatch,
                        parcel_number: Some(parcel.parcel_number),
                        factors,
                    },
                    Err(e) => {
                        tracing::error!(photo_id = %photo.id, error = %e, "Property resolution failed");
                        self.restore_status(photo.id, prior_status).await;
                        return Err(e.into());
                    }
                }
            }
            Ok(Err(e)) if e.is_recordable() => {
                tracing::warn!(photo_id = %photo.id, error = %e, "Recording pipeline failure on photo");
                MatchOutcome::Error {
                    message: e.to_string(),
                }
            }
            Ok(Err(e)) => {
                self.restore_status(photo.id, prior_status).await;
                return Err(e);
            }
            Err(_) => {
                let e = PipelineError::Timeout(timeout);
                tracing::warn!(photo_id = %photo.id, "Photo pipeline timed out");
                MatchOutcome::Error {
                    message: e.to_string(),
                }
            }
        };

        if let Err(e) = self.persist(&photo, &outcome).await {
            tracing::error!(photo_id = %photo.id, error = %e, "Failed to persist match outcome");
            self.restore_status(photo.id, prior_status).await;
            return Err(e);
        }

        tracing::info!(
            photo_id = %photo.id,
            batch_id = photo.batch_id.as_deref().unwrap_or(""),
            method = outcome.method().as_str(),
            confidence = outcome.confidence().unwrap_or(0.0),
            "Photo match outcome"
        );
        Ok(MatchResult {
            photo_id: photo.id,
            outcome,
        })
    }

    /// Steps up to the confidence gate; no database writes happen here
    async fn evaluate(&self, photo: &PhotoRecord) -> Result<Evaluation, PipelineError> {
        let coordinate = match (&photo.latitude, &photo.longitude) {
            (Some(lat), Some(lng)) => match validate_coordinate(lat.clone(), lng.clone()) {
                Ok(coordinate) => coordinate,
                Err(e) => {
                    return Ok(Evaluation::Decided(MatchOutcome::unassigned(
                        MatchMethod::InvalidCoordinates,
                        e.to_string(),
                    )))
                }
            },
            _ => {
                return Ok(Evaluation::Decided(MatchOutcome::unassigned(
                    MatchMethod::NoCoordinates,
                    "photo has no GPS coordinates",
                )))
            }
        };

        let Some(parcel) = self.find_parcel(&coordinate).await? else {
            return Ok(Evaluation::Decided(MatchOutcome::unassigned(
                MatchMethod::NoParcelData,
                "no parcel found near photo coordinates",
            )));
        };

        let contained = parcel
            .boundary
            .as_ref()
            .map(|boundary| point_in_polygon(&coordinate, boundary))
            .unwrap_or(false);
        if !contained {
            return Ok(Evaluation::Decided(MatchOutcome::unassigned(
                MatchMethod::CoordinateOutsideParcel,
                format!("coordinate outside parcel {}", parcel.parcel_number),
            )));
        }

        let factors = self
            .score(photo, &coordinate, &parcel.reference_point, Some(&parcel))
            .await?;
        if !factors.meets_threshold() {
            return Ok(Evaluation::Decided(MatchOutcome::Unassigned {
                method: MatchMethod::LowConfidence,
                reason: format!(
                    "confidence {:.4} below threshold {:.2}",
                    factors.overall, factors.threshold
                ),
                confidence: Some(factors.overall),
                factors: Some(factors),
            }));
        }

        Ok(Evaluation::Accepted { parcel, factors })
    }

    /// Cached parcel, or a fresh density-adjusted lookup
    async fn find_parcel(&self, coordinate: &Coordinate) -> Result<Option<ParcelRecord>, PipelineError> {
        let key = self.cache.key_for(coordinate);
        if let Some(parcel) = self.cache.get(&key) {
            tracing::debug!(key = %key, "Parcel cache hit");
            return Ok(Some(parcel));
        }
        tracing::debug!(key = %key, "Parcel cache miss");

        let parcel = self.lookup.lookup_adaptive(coordinate).await?;
        if let Some(parcel) = &parcel {
            self.cache.put(key, parcel.clone());
        }
        Ok(parcel)
    }

    async fn score(
        &self,
        photo: &PhotoRecord,
        coordinate: &Coordinate,
        reference: &Coordinate,
        parcel: Option<&ParcelRecord>,
    ) -> Result<ConfidenceBreakdown, PipelineError> {
        let spatial = SpatialEvidence {
            photo: *coordinate,
            reference: *reference,
            boundary: parcel.and_then(|p| p.boundary.as_ref()),
            heading: photo.heading,
        };

        let metadata = if photo.has_capture_metadata() {
            Some(MetadataEvidence {
                captured_at: photo.captured_at,
                altitude: photo.altitude,
                reference_altitude: self.reference_altitude(photo).await?,
            })
        } else {
            tracing::debug!(photo_id = %photo.id, "No capture metadata, scoring spatial factors only");
            None
        };

        Ok(self.scorer.score(&spatial, metadata.as_ref()))
    }

    /// Mean altitude of batch siblings that recorded one
    async fn reference_altitude(&self, photo: &PhotoRecord) -> Result<Option<f64>, PipelineError> {
        let Some(batch_id) = photo.batch_id.as_deref() else {
            return Ok(None);
        };
        let altitudes: Vec<f64> = photos::load_batch_siblings(&self.db, batch_id, photo.id)
            .await?
            .into_iter()
            .filter_map(|sibling| sibling.altitude)
            .collect();
        if altitudes.is_empty() {
            return Ok(None);
        }
        Ok(Some(altitudes.iter().sum::<f64>() / altitudes.len() as f64))
    }

    /// Cached parcel for a manual assignment, if it is the property's parcel
    fn cached_parcel_for(&self, coordinate: &Coordinate, property: &PropertyRecord) -> Option<ParcelRecord> {
        [
            self.cache.key_for(coordinate),
            self.cache.key_for(&property_point(property)),
        ]
        .iter()
        .filter_map(|key| self.cache.get(key))
        .find(|parcel| property.parcel_number.as_deref() == Some(parcel.parcel_number.as_str()))
    }

    async fn persist(&self, photo: &PhotoRecord, outcome: &MatchOutcome) -> Result<(), PipelineError> {
        let metadata = MatchMetadata::from_outcome(outcome, parcel_common::time::now());
        let (status, property_id, confidence) = match outcome {
            MatchOutcome::Matched {
                property_id,
                confidence,
                ..
            } => (ProcessingStatus::Processed, Some(*property_id), Some(*confidence)),
            MatchOutcome::Unassigned { confidence, .. } => (ProcessingStatus::Pending, None, *confidence),
            MatchOutcome::Error { .. } => (ProcessingStatus::Error, None, None),
        };

        photos::save_outcome(&self.db, photo.id, status, property_id, confidence, &metadata).await?;
        Ok(())
    }

    async fn restore_status(&self, photo_id: Uuid, status: ProcessingStatus) {
        if let Err(e) = photos::set_status(&self.db, photo_id, status).await {
            tracing::error!(photo_id = %photo_id, error = %e, "Failed to restore photo status");
        }
    }
}

fn photo_coordinate(photo: &PhotoRecord) -> Option<Coordinate> {
    match (&photo.latitude, &photo.longitude) {
        (Some(lat), Some(lng)) => validate_coordinate(lat.clone(), lng.clone()).ok(),
        _ => None,
    }
}

fn property_point(property: &PropertyRecord) -> Coordinate {
    Coordinate::new(property.latitude, property.longitude)
}
