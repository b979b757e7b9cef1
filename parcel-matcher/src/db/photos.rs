//! Photo persistence
//!
//! The upload collaborator inserts rows; the orchestrator is the only writer
//! of status, property id, confidence and match metadata.

use super::parse_uuid;
use crate::models::{MatchMetadata, PhotoRecord, ProcessingStatus};
use chrono::{DateTime, Utc};
use parcel_common::{Error, RawDegrees, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const PHOTO_COLUMNS: &str = r#"
    id, batch_id,
    CAST(latitude AS TEXT) AS latitude,
    CAST(longitude AS TEXT) AS longitude,
    altitude, heading, captured_at, device_id,
    processing_status, property_id, match_confidence, match_metadata
"#;

fn raw_to_text(raw: &RawDegrees) -> String {
    match raw {
        RawDegrees::Number(v) => v.to_string(),
        RawDegrees::Text(s) => s.clone(),
    }
}

fn row_to_photo(row: &SqliteRow) -> Result<PhotoRecord> {
    let id: String = row.get("id");
    let status: String = row.get("processing_status");
    let property_id: Option<String> = row.get("property_id");
    let captured_at: Option<String> = row.get("captured_at");
    let metadata: Option<String> = row.get("match_metadata");
    let latitude: Option<String> = row.get("latitude");
    let longitude: Option<String> = row.get("longitude");

    let captured_at = captured_at.and_then(|s| match DateTime::parse_from_rfc3339(&s) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!(photo_id = %id, value = %s, error = %e, "Ignoring unparseable capture timestamp");
            None
        }
    });

    let match_metadata = metadata.and_then(|s| match serde_json::from_str::<MatchMetadata>(&s) {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::warn!(photo_id = %id, error = %e, "Ignoring unparseable match metadata");
            None
        }
    });

    Ok(PhotoRecord {
        id: parse_uuid(&id)?,
        batch_id: row.get("batch_id"),
        latitude: latitude.map(RawDegrees::Text),
        longitude: longitude.map(RawDegrees::Text),
        altitude: row.get("altitude"),
        heading: row.get("heading"),
        captured_at,
        device_id: row.get("device_id"),
        processing_status: ProcessingStatus::parse(&status).ok_or_else(|| {
            Error::InvalidInput(format!("unknown processing status {:?}", status))
        })?,
        property_id: property_id.map(|s| parse_uuid(&s)).transpose()?,
        match_confidence: row.get("match_confidence"),
        match_metadata,
    })
}

/// Insert a photo row (used by the upload collaborator and tests)
pub async fn insert_photo(pool: &SqlitePool, photo: &PhotoRecord) -> Result<()> {
    let metadata = photo
        .match_metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("serialize match metadata: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO photos (
            id, batch_id, latitude, longitude, altitude, heading, captured_at, device_id,
            processing_status, property_id, match_confidence, match_metadata,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(photo.id.to_string())
    .bind(&photo.batch_id)
    .bind(photo.latitude.as_ref().map(raw_to_text))
    .bind(photo.longitude.as_ref().map(raw_to_text))
    .bind(photo.altitude)
    .bind(photo.heading)
    .bind(photo.captured_at.map(|ts| ts.to_rfc3339()))
    .bind(&photo.device_id)
    .bind(photo.processing_status.as_str())
    .bind(photo.property_id.map(|id| id.to_string()))
    .bind(photo.match_confidence)
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load photo by id
pub async fn load_photo(pool: &SqlitePool, id: Uuid) -> Result<Option<PhotoRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM photos WHERE id = ?", PHOTO_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_photo).transpose()
}

/// Other photos in the same batch
pub async fn load_batch_siblings(
    pool: &SqlitePool,
    batch_id: &str,
    exclude: Uuid,
) -> Result<Vec<PhotoRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM photos WHERE batch_id = ? AND id != ? ORDER BY created_at, id",
        PHOTO_COLUMNS
    ))
    .bind(batch_id)
    .bind(exclude.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_photo).collect()
}

/// Photos in a given processing status, oldest first
pub async fn load_photos_by_status(
    pool: &SqlitePool,
    status: ProcessingStatus,
) -> Result<Vec<PhotoRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM photos WHERE processing_status = ? ORDER BY created_at, id",
        PHOTO_COLUMNS
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_photo).collect()
}

/// Photos currently assigned to a property
pub async fn load_assigned_photos(pool: &SqlitePool) -> Result<Vec<PhotoRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM photos WHERE property_id IS NOT NULL ORDER BY created_at, id",
        PHOTO_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_photo).collect()
}

/// Photos without a property that are not mid-pipeline
pub async fn load_unassigned_photos(pool: &SqlitePool) -> Result<Vec<PhotoRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM photos WHERE property_id IS NULL AND processing_status != 'processing' ORDER BY created_at, id",
        PHOTO_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_photo).collect()
}

/// Update only the processing status
pub async fn set_status(pool: &SqlitePool, id: Uuid, status: ProcessingStatus) -> Result<()> {
    let result = sqlx::query(
        "UPDATE photos SET processing_status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("photo {}", id)));
    }
    Ok(())
}

/// Persist a pipeline outcome in one statement
pub async fn save_outcome(
    pool: &SqlitePool,
    id: Uuid,
    status: ProcessingStatus,
    property_id: Option<Uuid>,
    confidence: Option<f64>,
    metadata: &MatchMetadata,
) -> Result<()> {
    let metadata = serde_json::to_string(metadata)
        .map_err(|e| Error::Internal(format!("serialize match metadata: {}", e)))?;

    let result = sqlx::query(
        r#"
        UPDATE photos SET
            processing_status = ?,
            property_id = ?,
            match_confidence = ?,
            match_metadata = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(property_id.map(|p| p.to_string()))
    .bind(confidence)
    .bind(metadata)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("photo {}", id)));
    }
    Ok(())
}
