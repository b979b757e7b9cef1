//! HTTP API handlers for parcel-matcher

pub mod geocode;
pub mod health;
pub mod photos;

pub use geocode::geocode_routes;
pub use health::health_routes;
pub use photos::photo_routes;
