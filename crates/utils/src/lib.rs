//! Shared utilities for wiretap
//!
//! Log subscriber setup and crash-safe file writes used by the capture
//! pipeline.

pub mod atomic_file;
pub mod tracing;

pub use atomic_file::*;
pub use self::tracing::init as init_tracing;
