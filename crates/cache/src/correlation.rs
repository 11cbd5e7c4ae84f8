//! Request/response correlation cache
//!
//! Requests wait in the pending store until their response arrives, at which
//! point both move to the completed store as one `EventRecord`. Keeping the
//! two stores apart lets a periodic flush take every completed pair without
//! scanning requests that are still in flight; only a forced flush drains
//! pending requests as well.
//!
//! All operations take one mutex, so request completions and the flush timer
//! can call in concurrently from any task.

use crate::entry::{CacheStats, CompletedEntry, PendingEntry};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use wiretap_core::{context, EventRecord, RequestRecord, ResponseRecord};

#[derive(Debug, Default)]
struct CacheState {
    pending: HashMap<String, PendingEntry>,
    completed: IndexMap<String, CompletedEntry>,
}

/// In-flight and completed exchanges keyed by correlation id
#[derive(Debug, Default)]
pub struct CorrelationCache {
    state: Mutex<CacheState>,
    ttl: Option<Duration>,
}

impl CorrelationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries older than `ttl` are evicted on the next access
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
        }
    }

    /// Store an observed request
    ///
    /// The calling chain's scope tags and trace id are stamped onto the
    /// record; tags already on the record take precedence. A duplicate id is
    /// logged and the newer record replaces the older one.
    pub fn put_request(&self, id: impl Into<String>, mut record: RequestRecord) {
        let id = id.into();
        if let Some(scope) = context::current_scope() {
            let mut tags = scope.tags().clone();
            tags.append(&mut record.tags);
            record.tags = tags;
            if record.trace_id.is_none() {
                record.trace_id = scope.trace_id().map(str::to_string);
            }
        }

        let mut state = self.state.lock();
        self.evict_expired(&mut state);

        if state
            .pending
            .insert(id.clone(), PendingEntry::new(record))
            .is_some()
        {
            warn!(correlation_id = %id, "duplicate request observed, keeping the newer one");
        } else {
            trace!(correlation_id = %id, "request cached");
        }
    }

    /// Attach a response to its pending request
    ///
    /// Returns false, and caches nothing, when no request with `id` is
    /// pending.
    pub fn put_response(&self, id: &str, response: ResponseRecord) -> bool {
        let mut state = self.state.lock();
        self.evict_expired(&mut state);

        let Some(entry) = state.pending.remove(id) else {
            debug!(correlation_id = %id, "dropping response for unknown request");
            return false;
        };

        let event = EventRecord::completed(entry.record, response);
        if state
            .completed
            .insert(id.to_string(), CompletedEntry::new(event))
            .is_some()
        {
            warn!(correlation_id = %id, "replacing completed event with the same id");
        }
        trace!(correlation_id = %id, "response merged");
        true
    }

    /// Remove and return every completed event
    ///
    /// With `force`, pending requests are drained too, as events without a
    /// response.
    pub fn drain(&self, force: bool) -> Vec<EventRecord> {
        let mut state = self.state.lock();
        self.evict_expired(&mut state);

        let mut events: Vec<EventRecord> = state
            .completed
            .drain(..)
            .map(|(_, entry)| entry.event)
            .collect();

        if force && !state.pending.is_empty() {
            let mut pending: Vec<PendingEntry> =
                state.pending.drain().map(|(_, entry)| entry).collect();
            pending.sort_by_key(|entry| entry.inserted_at);
            events.extend(
                pending
                    .into_iter()
                    .map(|entry| EventRecord::request_only(entry.record)),
            );
        }

        if !events.is_empty() {
            debug!(count = events.len(), force, "drained cache");
        }
        events
    }

    pub fn pending_len(&self) -> usize {
        let mut state = self.state.lock();
        self.evict_expired(&mut state);
        state.pending.len()
    }

    pub fn completed_len(&self) -> usize {
        let mut state = self.state.lock();
        self.evict_expired(&mut state);
        state.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_len() == 0 && self.completed_len() == 0
    }

    /// Occupancy snapshot for telemetry
    pub fn stats(&self) -> CacheStats {
        let mut state = self.state.lock();
        self.evict_expired(&mut state);

        let approx_bytes = state
            .pending
            .values()
            .map(|e| serde_json::to_vec(&e.record).map(|v| v.len()).unwrap_or(0))
            .chain(
                state
                    .completed
                    .values()
                    .map(|e| serde_json::to_vec(&e.event).map(|v| v.len()).unwrap_or(0)),
            )
            .sum();

        CacheStats {
            pending: state.pending.len(),
            completed: state.completed.len(),
            keys: state
                .completed
                .keys()
                .chain(state.pending.keys())
                .cloned()
                .collect(),
            approx_bytes,
        }
    }

    fn evict_expired(&self, state: &mut CacheState) {
        if self.ttl.is_none() {
            return;
        }
        let now = Instant::now();
        let before = state.pending.len() + state.completed.len();

        state
            .pending
            .retain(|_, entry| !entry.is_expired(self.ttl, now));
        state
            .completed
            .retain(|_, entry| !entry.is_expired(self.ttl, now));

        let evicted = before - (state.pending.len() + state.completed.len());
        if evicted > 0 {
            debug!(evicted, "evicted expired cache entries");
        }
    }
}
