//! Property resolution (find-or-create)
//!
//! Maps a matched parcel to its durable property row. Rows are keyed on the
//! parcel reference point quantized to 6 decimal places; at most one live row
//! exists per key.
//!
//! Concurrent resolutions of the same key are serialized in-process by a keyed
//! async mutex. The partial unique index on `properties(latitude, longitude)`
//! covers other processes: a losing insert re-reads and updates instead.

use crate::db::properties;
use crate::models::{ParcelRecord, PropertyRecord, PropertyStatus};
use crate::services::owner_classifier::OwnerClassifier;
use parcel_common::{Coordinate, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Decimal places of stored property coordinates
pub const PROPERTY_KEY_PRECISION: i32 = 6;

pub struct PropertyResolver {
    db: SqlitePool,
    classifier: Arc<dyn OwnerClassifier>,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PropertyResolver {
    pub fn new(db: SqlitePool, classifier: Arc<dyn OwnerClassifier>) -> Self {
        Self {
            db,
            classifier,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Property coordinates for a parcel
    pub fn property_point(parcel: &ParcelRecord) -> Coordinate {
        parcel.reference_point.quantized(PROPERTY_KEY_PRECISION)
    }

    /// Id of the live property for `parcel`, creating or refreshing it
    ///
    /// Updates overwrite every parcel-derived field and keep the operator-set
    /// lifecycle status. New rows start as `pending`.
    pub async fn resolve(&self, parcel: &ParcelRecord) -> Result<Uuid> {
        let point = Self::property_point(parcel);
        let key = point.quantized_key(PROPERTY_KEY_PRECISION as usize);

        let lock = self.key_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.resolve_locked(parcel, &point).await
        };
        drop(lock);
        self.release_key(&key);

        result
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Drop the key's mutex once nobody else holds or awaits it
    fn release_key(&self, key: &str) {
        let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    async fn resolve_locked(&self, parcel: &ParcelRecord, point: &Coordinate) -> Result<Uuid> {
        if let Some(existing) =
            properties::find_live_by_location(&self.db, point.latitude, point.longitude).await?
        {
            self.refresh(&existing, parcel).await?;
            return Ok(existing.id);
        }
        self.create(parcel, point).await
    }

    /// Insert a new row; if another writer got there first, adopt its row
    async fn create(&self, parcel: &ParcelRecord, point: &Coordinate) -> Result<Uuid> {
        let record = self.build_record(Uuid::new_v4(), parcel, point, PropertyStatus::Pending);
        match properties::insert_property(&self.db, &record).await {
            Ok(()) => {
                tracing::info!(
                    property_id = %record.id,
                    parcel_number = %parcel.parcel_number,
                    owner_type = record.owner_type.as_str(),
                    "Created property"
                );
                Ok(record.id)
            }
            Err(err) if err.is_unique_violation() => {
                tracing::warn!(
                    parcel_number = %parcel.parcel_number,
                    "Property insert lost a race, updating the existing row"
                );
                let existing =
                    properties::find_live_by_location(&self.db, point.latitude, point.longitude)
                        .await?
                        .ok_or(err)?;
                self.refresh(&existing, parcel).await?;
                Ok(existing.id)
            }
            Err(err) => Err(err),
        }
    }

    async fn refresh(&self, existing: &PropertyRecord, parcel: &ParcelRecord) -> Result<()> {
        let point = Coordinate::new(existing.latitude, existing.longitude);
        let updated = self.build_record(existing.id, parcel, &point, existing.status);
        properties::update_parcel_fields(&self.db, &updated).await?;
        tracing::debug!(property_id = %existing.id, "Refreshed property from parcel data");
        Ok(())
    }

    fn build_record(
        &self,
        id: Uuid,
        parcel: &ParcelRecord,
        point: &Coordinate,
        status: PropertyStatus,
    ) -> PropertyRecord {
        PropertyRecord {
            id,
            latitude: point.latitude,
            longitude: point.longitude,
            address: parcel.address.line.clone(),
            city: parcel.address.city.clone(),
            state: parcel.address.state.clone(),
            postal_code: parcel.address.postal_code.clone(),
            owner_name: parcel.owner_name.clone(),
            owner_mailing_address: parcel.owner_mailing_address.clone(),
            owner_type: self.classifier.classify(parcel.owner_name.as_deref()),
            parcel_number: Some(parcel.parcel_number.clone()),
            year_built: parcel.year_built,
            total_value: parcel.valuation.total,
            improvement_value: parcel.valuation.improvements,
            land_value: parcel.valuation.land,
            zoning: parcel.zoning.clone(),
            status,
            deleted: false,
            created_at: None,
            updated_at: None,
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.key_locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::{OwnerType, ParcelAddress, Valuation};
    use crate::services::owner_classifier::KeywordOwnerClassifier;

    fn parcel(owner: &str, zoning: &str) -> ParcelRecord {
        ParcelRecord {
            parcel_number: "14-22-301-004".to_string(),
            reference_point: Coordinate::new(39.781_721_4, -89.650_148_2),
            address: ParcelAddress {
                line: Some("12 Elm St".to_string()),
                city: Some("Springfield".to_string()),
                state: Some("IL".to_string()),
                postal_code: Some("62701".to_string()),
            },
            owner_name: Some(owner.to_string()),
            owner_mailing_address: None,
            year_built: Some(1962),
            valuation: Valuation {
                total: Some(250_000.0),
                improvements: Some(180_000.0),
                land: Some(70_000.0),
            },
            zoning: Some(zoning.to_string()),
            boundary: None,
            nearby_parcel_count: None,
        }
    }

    async fn resolver() -> (PropertyResolver, SqlitePool) {
        let pool = test_pool().await;
        let resolver = PropertyResolver::new(pool.clone(), Arc::new(KeywordOwnerClassifier::default()));
        (resolver, pool)
    }

    #[tokio::test]
    async fn test_creates_pending_property_at_quantized_point() {
        let (resolver, pool) = resolver().await;
        let id = resolver.resolve(&parcel("Acme Holdings LLC", "R-1")).await.unwrap();

        let stored = properties::load_property(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.status, PropertyStatus::Pending);
        assert_eq!(stored.owner_type, OwnerType::Business);
        assert_eq!(stored.latitude, 39.781_721);
        assert_eq!(stored.longitude, -89.650_148);
        assert_eq!(stored.parcel_number.as_deref(), Some("14-22-301-004"));
    }

    #[tokio::test]
    async fn test_second_resolve_updates_and_preserves_status() {
        let (resolver, pool) = resolver().await;
        let first = resolver.resolve(&parcel("Jane Doe", "R-1")).await.unwrap();
        properties::set_property_status(&pool, first, PropertyStatus::Inspected)
            .await
            .unwrap();

        let second = resolver.resolve(&parcel("City of Springfield", "C-2")).await.unwrap();
        assert_eq!(first, second);

        let stored = properties::load_property(&pool, first).await.unwrap().unwrap();
        assert_eq!(stored.status, PropertyStatus::Inspected);
        assert_eq!(stored.zoning.as_deref(), Some("C-2"));
        assert_eq!(stored.owner_type, OwnerType::Government);
        assert_eq!(
            properties::count_live_at(&pool, 39.781_721, -89.650_148).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_soft_deleted_property_is_replaced() {
        let (resolver, pool) = resolver().await;
        let first = resolver.resolve(&parcel("Jane Doe", "R-1")).await.unwrap();
        properties::soft_delete_property(&pool, first).await.unwrap();

        let second = resolver.resolve(&parcel("Jane Doe", "R-1")).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_create_one_property() {
        let (resolver, pool) = resolver().await;
        let resolver = Arc::new(resolver);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let resolver = resolver.clone();
            tasks.spawn(async move { resolver.resolve(&parcel("Jane Doe", "R-1")).await });
        }

        let mut ids = Vec::new();
        while let Some(result) = tasks.join_next().await {
            ids.push(result.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(
            properties::count_live_at(&pool, 39.781_721, -89.650_148).await.unwrap(),
            1
        );
        assert_eq!(resolver.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_insert_losing_race_adopts_existing_row() {
        let (resolver, pool) = resolver().await;
        let point = PropertyResolver::property_point(&parcel("x", "x"));

        // Another process inserts after this resolver found no live row
        let rival = resolver.build_record(Uuid::new_v4(), &parcel("Jane Doe", "R-1"), &point, PropertyStatus::Inspected);
        properties::insert_property(&pool, &rival).await.unwrap();

        let id = resolver.create(&parcel("Acme Holdings LLC", "C-3"), &point).await.unwrap();
        assert_eq!(id, rival.id);

        let stored = properties::load_property(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.zoning.as_deref(), Some("C-3"));
        assert_eq!(stored.owner_type, OwnerType::Business);
        assert_eq!(stored.status, PropertyStatus::Inspected);
        assert_eq!(
            properties::count_live_at(&pool, point.latitude, point.longitude).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_row_from_another_writer_is_updated() {
        let (resolver, pool) = resolver().await;
        // Row written by another process sharing the database
        let point = PropertyResolver::property_point(&parcel("x", "x"));
        let rival = resolver.build_record(Uuid::new_v4(), &parcel("Jane Doe", "R-1"), &point, PropertyStatus::Pending);
        properties::insert_property(&pool, &rival).await.unwrap();

        let record = resolver.build_record(Uuid::new_v4(), &parcel("Jane Doe", "R-2"), &point, PropertyStatus::Pending);
        let err = properties::insert_property(&pool, &record).await.unwrap_err();
        assert!(err.is_unique_violation());

        let id = resolver.resolve(&parcel("Jane Doe", "R-3")).await.unwrap();
        assert_eq!(id, rival.id);
        let stored = properties::load_property(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.zoning.as_deref(), Some("R-3"));
    }
}
