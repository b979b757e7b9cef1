//! Property persistence

use super::parse_uuid;
use crate::models::{OwnerType, PropertyRecord, PropertyStatus};
use parcel_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const PROPERTY_COLUMNS: &str = r#"
    id, latitude, longitude, address, city, state, postal_code,
    owner_name, owner_mailing_address, owner_type, parcel_number, year_built,
    total_value, improvement_value, land_value, zoning, status, deleted,
    created_at, updated_at
"#;

fn row_to_property(row: &SqliteRow) -> Result<PropertyRecord> {
    let id: String = row.get("id");
    let owner_type: String = row.get("owner_type");
    let status: String = row.get("status");
    let deleted: i64 = row.get("deleted");

    Ok(PropertyRecord {
        id: parse_uuid(&id)?,
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        address: row.get("address"),
        city: row.get("city"),
        state: row.get("state"),
        postal_code: row.get("postal_code"),
        owner_name: row.get("owner_name"),
        owner_mailing_address: row.get("owner_mailing_address"),
        owner_type: OwnerType::parse(&owner_type)
            .ok_or_else(|| Error::InvalidInput(format!("unknown owner type {:?}", owner_type)))?,
        parcel_number: row.get("parcel_number"),
        year_built: row.get("year_built"),
        total_value: row.get("total_value"),
        improvement_value: row.get("improvement_value"),
        land_value: row.get("land_value"),
        zoning: row.get("zoning"),
        status: PropertyStatus::parse(&status)
            .ok_or_else(|| Error::InvalidInput(format!("unknown property status {:?}", status)))?,
        deleted: deleted != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Find the live (non-deleted) property at an exact coordinate pair
pub async fn find_live_by_location(
    pool: &SqlitePool,
    latitude: f64,
    longitude: f64,
) -> Result<Option<PropertyRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM properties WHERE latitude = ? AND longitude = ? AND deleted = 0 LIMIT 1",
        PROPERTY_COLUMNS
    ))
    .bind(latitude)
    .bind(longitude)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_property).transpose()
}

/// Load property by id, including soft-deleted rows
pub async fn load_property(pool: &SqlitePool, id: Uuid) -> Result<Option<PropertyRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM properties WHERE id = ?", PROPERTY_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_property).transpose()
}

/// Insert a new property row
///
/// Fails with a unique-constraint violation if a live row already exists at
/// the same coordinates.
pub async fn insert_property(pool: &SqlitePool, property: &PropertyRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO properties (
            id, latitude, longitude, address, city, state, postal_code,
            owner_name, owner_mailing_address, owner_type, parcel_number, year_built,
            total_value, improvement_value, land_value, zoning, status, deleted,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(property.id.to_string())
    .bind(property.latitude)
    .bind(property.longitude)
    .bind(&property.address)
    .bind(&property.city)
    .bind(&property.state)
    .bind(&property.postal_code)
    .bind(&property.owner_name)
    .bind(&property.owner_mailing_address)
    .bind(property.owner_type.as_str())
    .bind(&property.parcel_number)
    .bind(property.year_built)
    .bind(property.total_value)
    .bind(property.improvement_value)
    .bind(property.land_value)
    .bind(&property.zoning)
    .bind(property.status.as_str())
    .bind(property.deleted as i64)
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite the parcel-derived fields of an existing property
///
/// `status`, `deleted` and `created_at` are left untouched.
pub async fn update_parcel_fields(pool: &SqlitePool, property: &PropertyRecord) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE properties SET
            address = ?,
            city = ?,
            state = ?,
            postal_code = ?,
            owner_name = ?,
            owner_mailing_address = ?,
            owner_type = ?,
            parcel_number = ?,
            year_built = ?,
            total_value = ?,
            improvement_value = ?,
            land_value = ?,
            zoning = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&property.address)
    .bind(&property.city)
    .bind(&property.state)
    .bind(&property.postal_code)
    .bind(&property.owner_name)
    .bind(&property.owner_mailing_address)
    .bind(property.owner_type.as_str())
    .bind(&property.parcel_number)
    .bind(property.year_built)
    .bind(property.total_value)
    .bind(property.improvement_value)
    .bind(property.land_value)
    .bind(&property.zoning)
    .bind(property.id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("property {}", property.id)));
    }
    Ok(())
}

/// Operator-driven lifecycle change
pub async fn set_property_status(pool: &SqlitePool, id: Uuid, status: PropertyStatus) -> Result<()> {
    let result = sqlx::query(
        "UPDATE properties SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("property {}", id)));
    }
    Ok(())
}

/// Soft-delete a property; the row stays for history
pub async fn soft_delete_property(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let result = sqlx::query(
        "UPDATE properties SET deleted = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("property {}", id)));
    }
    Ok(())
}

/// Number of live properties at a coordinate pair
pub async fn count_live_at(pool: &SqlitePool, latitude: f64, longitude: f64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM properties WHERE latitude = ? AND longitude = ? AND deleted = 0",
    )
    .bind(latitude)
    .bind(longitude)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
