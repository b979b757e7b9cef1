//! Database initialization
//!
//! Creates the SQLite database on first run and applies the schema for the
//! tables the matching engine reads and writes (`photos`, `properties`).
//! Every statement is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers alongside the single writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Apply the schema to an already-open pool
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    create_properties_table(pool).await?;
    create_photos_table(pool).await?;
    Ok(())
}

/// Durable, de-duplicated property records
///
/// The partial unique index allows one live row per coordinate pair while
/// soft-deleted rows remain for history.
pub async fn create_properties_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS properties (
            id TEXT PRIMARY KEY,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            address TEXT,
            city TEXT,
            state TEXT,
            postal_code TEXT,
            owner_name TEXT,
            owner_mailing_address TEXT,
            owner_type TEXT NOT NULL DEFAULT 'individual'
                CHECK (owner_type IN ('individual', 'business', 'government')),
            parcel_number TEXT,
            year_built INTEGER,
            total_value REAL,
            improvement_value REAL,
            land_value REAL,
            zoning TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('processing', 'pending', 'inspected')),
            deleted INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_properties_location
        ON properties (latitude, longitude)
        WHERE deleted = 0
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Photo records created by the upload collaborator
///
/// Coordinates use NUMERIC affinity: numeric text is stored as a number,
/// anything else is kept verbatim so validation can reject it explicitly.
pub async fn create_photos_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS photos (
            id TEXT PRIMARY KEY,
            batch_id TEXT,
            latitude NUMERIC,
            longitude NUMERIC,
            altitude REAL,
            heading REAL,
            captured_at TEXT,
            device_id TEXT,
            processing_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (processing_status IN ('pending', 'processing', 'processed', 'error')),
            property_id TEXT REFERENCES properties(id),
            match_confidence REAL,
            match_metadata TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_photos_status ON photos (processing_status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_photos_batch ON photos (batch_id)")
        .execute(pool)
        .await?;

    Ok(())
}
