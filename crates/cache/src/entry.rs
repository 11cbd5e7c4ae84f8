//! Cache entries and statistics

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use wiretap_core::{EventRecord, RequestRecord};

/// A request still waiting for its response
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub record: RequestRecord,
    pub inserted_at: Instant,
}

/// A request merged with its response, ready for the next flush
#[derive(Debug, Clone)]
pub struct CompletedEntry {
    pub event: EventRecord,
    pub inserted_at: Instant,
}

impl PendingEntry {
    pub fn new(record: RequestRecord) -> Self {
        Self {
            record,
            inserted_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        is_expired(self.inserted_at, ttl, now)
    }
}

impl CompletedEntry {
    pub fn new(event: EventRecord) -> Self {
        Self {
            event,
            inserted_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        is_expired(self.inserted_at, ttl, now)
    }
}

fn is_expired(inserted_at: Instant, ttl: Option<Duration>, now: Instant) -> bool {
    match ttl {
        Some(ttl) => now.saturating_duration_since(inserted_at) > ttl,
        None => false,
    }
}

/// Snapshot of cache occupancy, reported to the telemetry sink
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub pending: usize,
    pub completed: usize,
    pub keys: Vec<String>,
    /// Encoded size of every cached record
    pub approx_bytes: usize,
}

impl CacheStats {
    pub fn total(&self) -> usize {
        self.pending + self.completed
    }
}
