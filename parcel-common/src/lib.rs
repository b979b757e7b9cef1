//! # Parcel Common Library
//!
//! Shared code for the parcel matching services:
//! - Error type
//! - Bootstrap configuration loading
//! - Geometry kernel (distance, bearing, containment)
//! - Clock abstraction
//! - Database schema initialization

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod geometry;
pub mod time;

pub use error::{Error, Result};
pub use geometry::{Coordinate, InvalidCoordinate, ParcelBoundary, PolygonRings, RawDegrees};
pub use time::{Clock, SystemClock};
