//! Data models for the matching engine

pub mod confidence;
pub mod match_result;
pub mod parcel;
pub mod photo;
pub mod property;

pub use confidence::{ConfidenceBreakdown, FactorScore};
pub use match_result::{BatchSummary, MatchMetadata, MatchMethod, MatchOutcome, MatchResult};
pub use parcel::{ParcelAddress, ParcelRecord, Valuation};
pub use photo::{PhotoRecord, ProcessingStatus};
pub use property::{OwnerType, PropertyRecord, PropertyStatus};
