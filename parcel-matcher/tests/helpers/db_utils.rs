//! Database Test Utilities

use anyhow::Result;
use parcel_matcher::db::{init_database, photos};
use parcel_matcher::models::PhotoRecord;
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

/// Create temporary file-backed database with the schema applied
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_parcels.db");
    let pool = init_database(&db_path).await?;
    Ok((temp_dir, pool))
}

pub async fn insert_photos(pool: &SqlitePool, records: &[PhotoRecord]) -> Result<()> {
    for photo in records {
        photos::insert_photo(pool, photo).await?;
    }
    Ok(())
}

pub async fn reload_photo(pool: &SqlitePool, id: Uuid) -> PhotoRecord {
    photos::load_photo(pool, id)
        .await
        .expect("Failed to load photo")
        .expect("Photo missing")
}

pub async fn count_live_properties(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM properties WHERE deleted = 0")
        .fetch_one(pool)
        .await
        .expect("Failed to count properties")
}
