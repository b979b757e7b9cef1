//! Property record (durable, de-duplicated location entity)

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner classification derived from the owner name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    Individual,
    Business,
    Government,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Individual => "individual",
            OwnerType::Business => "business",
            OwnerType::Government => "government",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "individual" => Some(OwnerType::Individual),
            "business" => Some(OwnerType::Business),
            "government" => Some(OwnerType::Government),
            _ => None,
        }
    }
}

/// Lifecycle status, progressed by operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyStatus {
    Processing,
    Pending,
    Inspected,
}

impl PropertyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyStatus::Processing => "processing",
            PropertyStatus::Pending => "pending",
            PropertyStatus::Inspected => "inspected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(PropertyStatus::Processing),
            "pending" => Some(PropertyStatus::Pending),
            "inspected" => Some(PropertyStatus::Inspected),
            _ => None,
        }
    }
}

/// Property row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub owner_name: Option<String>,
    pub owner_mailing_address: Option<String>,
    pub owner_type: OwnerType,
    pub parcel_number: Option<String>,
    pub year_built: Option<i32>,
    pub total_value: Option<f64>,
    pub improvement_value: Option<f64>,
    pub land_value: Option<f64>,
    pub zoning: Option<String>,
    pub status: PropertyStatus,
    pub deleted: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}
