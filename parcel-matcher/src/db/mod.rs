//! Database access for parcel-matcher
//!
//! Repository functions over the shared SQLite pool. The schema itself lives
//! in `parcel_common::db`.

pub mod photos;
pub mod properties;

pub use parcel_common::db::{init_database, init_schema};

use parcel_common::{Error, Result};
use uuid::Uuid;

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::InvalidInput(format!("bad id {:?}: {}", value, e)))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    // Single connection: every connection to :memory: is a separate database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    init_schema(&pool).await.expect("Failed to apply schema");
    pool
}
