//! Parcel cache
//!
//! Keyed by quantized `"lat,lng"` strings. Entries older than the TTL behave as
//! misses and are evicted on access. Two photos racing on the same miss may
//! both fetch; the second `put` simply overwrites an identical record.

use crate::models::ParcelRecord;
use chrono::{DateTime, Duration, Utc};
use parcel_common::{Clock, Coordinate, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Cached parcel and when it was fetched
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub parcel: ParcelRecord,
    pub fetched_at: DateTime<Utc>,
}

/// Concurrency-safe TTL cache of parcel lookups
pub struct ParcelCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    key_precision: usize,
    clock: Arc<dyn Clock>,
}

impl ParcelCache {
    pub fn new(ttl: Duration, key_precision: usize) -> Self {
        Self::with_clock(ttl, key_precision, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, key_precision: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            key_precision,
            clock,
        }
    }

    /// Cache key for a coordinate at this cache's precision
    pub fn key_for(&self, coordinate: &Coordinate) -> String {
        coordinate.quantized_key(self.key_precision)
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.fetched_at > self.ttl
    }

    /// Fresh entry for `key`, evicting it if stale
    pub fn get(&self, key: &str) -> Option<ParcelRecord> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(key) {
                None => return None,
                Some(entry) if !self.is_expired(entry, now) => return Some(entry.parcel.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        // Re-check: another caller may have refreshed it meanwhile
        if let Some(entry) = entries.get(key) {
            if !self.is_expired(entry, now) {
                return Some(entry.parcel.clone());
            }
            entries.remove(key);
            tracing::debug!(key, "Evicted stale parcel cache entry");
        }
        None
    }

    pub fn put(&self, key: impl Into<String>, parcel: ParcelRecord) {
        let entry = CacheEntry {
            parcel,
            fetched_at: self.clock.now(),
        };
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), entry);
    }

    /// Eviction hook for memory bounding; returns how many entries were dropped
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| now - entry.fetched_at <= self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
