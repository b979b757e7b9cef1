//! Utility modules for parcel-matcher

pub mod retry;

pub use retry::{retry_transient, RetryPolicy, Transient};
