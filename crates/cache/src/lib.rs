//! Correlation cache for captured HTTP exchanges
//!
//! Observed requests are held until their response arrives; completed pairs
//! are drained by the flush pipeline.

pub mod correlation;
pub mod entry;

pub use correlation::CorrelationCache;
pub use entry::{CacheStats, CompletedEntry, PendingEntry};
