//! The capture pipeline
//!
//! A [`Capture`] owns one correlation cache, one active rule set and the two
//! background timers that flush the cache and refresh the rules. Any number
//! of instances can coexist; each is closed independently.
//!
//! Failures never reach the host: delivery problems become a
//! [`FlushOutcome`], rule refresh problems are logged and the previous rules
//! stay active. The one failure that changes behaviour is a rejected
//! credential, which stops the instance for good.

use crate::fallback::FallbackWriter;
use crate::flush::prepare_batch;
use crate::observer::{ObservationSource, RequestParts, ResponseParts};
use crate::state::{FlushOutcome, PipelineState};
use crate::transport::{ErrorReport, HttpTransport, TelemetryReport, Transport};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use wiretap_cache::{CacheStats, CorrelationCache};
use wiretap_config::{CaptureConfig, RuleSet, SharedRules};
use wiretap_core::{context, RequestRecord, ResponseRecord, Result};
use wiretap_redaction::decide;

/// Handle to one pipeline instance; clones share the instance
#[derive(Clone)]
pub struct Capture {
    inner: Arc<CaptureInner>,
}

struct CaptureInner {
    config: CaptureConfig,
    instance_id: Uuid,
    cache: CorrelationCache,
    rules: SharedRules,
    transport: Arc<dyn Transport>,
    fallback: FallbackWriter,
    state: RwLock<PipelineState>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    sources: Mutex<Vec<Box<dyn ObservationSource>>>,
    /// Serialises flushes so a timer tick and `close` never interleave
    flush_lock: tokio::sync::Mutex<()>,
}

impl Drop for CaptureInner {
    fn drop(&mut self) {
        for handle in self.timers.get_mut().drain(..) {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Capture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capture")
            .field("instance_id", &self.inner.instance_id)
            .field("state", &*self.inner.state.read())
            .field("pending", &self.inner.cache.pending_len())
            .field("completed", &self.inner.cache.completed_len())
            .finish()
    }
}

impl Capture {
    /// Create an instance that delivers over HTTP
    pub fn new(config: CaptureConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create an instance with a custom transport
    pub fn with_transport(config: CaptureConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let inner = CaptureInner {
            cache: CorrelationCache::with_ttl(config.cache_ttl),
            rules: SharedRules::new(RuleSet::compile(&config.default_endpoint_config)),
            fallback: FallbackWriter::new(config.fallback_dir.clone()),
            instance_id: Uuid::new_v4(),
            transport,
            state: RwLock::new(PipelineState::Uninitialized),
            timers: Mutex::new(Vec::new()),
            sources: Mutex::new(Vec::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            config,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Load rules and start the background timers
    ///
    /// Remote rules are fetched once when enabled; if that fails the static
    /// default rules from the configuration stay active. Calling `init` on an
    /// instance that already left `Uninitialized` does nothing.
    pub async fn init(&self) -> Result<()> {
        if self.state() != PipelineState::Uninitialized {
            debug!(instance_id = %self.inner.instance_id, "capture already initialised");
            return Ok(());
        }

        if self.fetches_remote_config() {
            if let Err(e) = self.refresh_config().await {
                warn!(error = %e, "using default endpoint config");
            }
        }

        {
            let mut state = self.inner.state.write();
            if *state != PipelineState::Uninitialized {
                return Ok(());
            }
            *state = PipelineState::Running;
        }
        self.start_timers();

        info!(
            instance_id = %self.inner.instance_id,
            local_only = self.inner.config.is_local_only(),
            rules = self.inner.rules.load().rule_count(),
            "capture started"
        );
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        *self.inner.state.read()
    }

    pub fn instance_id(&self) -> Uuid {
        self.inner.instance_id
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.inner.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Attach a source to be torn down when the instance stops
    pub fn register_source(&self, source: Box<dyn ObservationSource>) {
        debug!(source = source.name(), "observation source registered");
        self.inner.sources.lock().push(source);
    }

    /// Whether traffic on the current call chain belongs to this instance
    ///
    /// Always true unless the instance is instance-scoped, in which case the
    /// current capture scope must carry this instance's id.
    pub fn is_within_active_scope(&self) -> bool {
        if !self.inner.config.instance_scoped {
            return true;
        }
        context::current_instance_id() == Some(self.inner.instance_id)
    }

    /// Run `fut` in a scope owned by this instance
    pub async fn with_instance_scope<F: Future>(&self, fut: F) -> F::Output {
        context::with_instance(self.inner.instance_id, fut).await
    }

    /// Cache an observed request
    ///
    /// Returns whether the request was admitted. Requests are refused before
    /// `init`, after the instance stopped, and when their endpoint is ignored.
    pub fn on_request_observed(&self, id: &str, record: RequestRecord) -> bool {
        // Held until the insert lands so the final drain in `close` sees it
        let state = self.inner.state.read();
        if !state.accepts_traffic() {
            debug!(correlation_id = %id, state = %*state, "request not admitted");
            return false;
        }

        let rules = self.inner.rules.load();
        if decide(&record, &rules).is_ignored() {
            debug!(correlation_id = %id, path = %record.path, "request matches an ignored endpoint");
            return false;
        }

        self.inner.cache.put_request(id, record);
        true
    }

    /// Attach an observed response to its request
    pub fn on_response_observed(&self, id: &str, record: ResponseRecord) -> bool {
        let state = self.inner.state.read();
        if !state.accepts_traffic() {
            debug!(correlation_id = %id, state = %*state, "response not admitted");
            return false;
        }
        self.inner.cache.put_response(id, record)
    }

    /// Build and cache a request from raw parts
    ///
    /// Out-of-scope traffic is skipped; a malformed request is logged and
    /// dropped.
    pub fn observe_request(&self, id: &str, parts: RequestParts) -> bool {
        if !self.is_within_active_scope() {
            return false;
        }
        match parts.into_record(id) {
            Ok(record) => self.on_request_observed(id, record),
            Err(e) => {
                warn!(error = %e, "dropping observed request");
                false
            }
        }
    }

    /// Build and attach a response from raw parts
    pub fn observe_response(&self, id: &str, parts: ResponseParts) -> bool {
        if !self.is_within_active_scope() {
            return false;
        }
        self.on_response_observed(id, parts.into_record())
    }

    /// Fetch remote rules and swap them in
    ///
    /// On failure the active rules are left untouched.
    pub async fn refresh_config(&self) -> Result<()> {
        refresh_config(&self.inner).await
    }

    /// Drain the cache and deliver what it held
    ///
    /// Non-forced flushes take completed exchanges only; forced flushes also
    /// take requests still waiting for a response.
    pub async fn flush(&self, force: bool) -> FlushOutcome {
        flush(&self.inner, force).await
    }

    /// Stop the instance, delivering everything still cached
    ///
    /// Timers stop first, after any flush they already started has finished.
    /// If requests are still in flight the instance waits `wait_after_close`
    /// for their responses before tearing down observation sources. Traffic is
    /// refused from the final flush onwards. Closing a stopped or closing
    /// instance returns [`FlushOutcome::Empty`].
    pub async fn close(&self, force: bool) -> FlushOutcome {
        {
            let mut state = self.inner.state.write();
            match *state {
                PipelineState::Draining | PipelineState::Stopping | PipelineState::Stopped => {
                    return FlushOutcome::Empty;
                }
                _ => *state = PipelineState::Draining,
            }
        }
        info!(instance_id = %self.inner.instance_id, force, "closing capture");

        stop_timers(&self.inner).await;

        let wait = self.inner.config.wait_after_close;
        if self.inner.cache.pending_len() > 0 && !wait.is_zero() {
            debug!(
                pending = self.inner.cache.pending_len(),
                wait = ?wait,
                "waiting for in-flight responses"
            );
            tokio::time::sleep(wait).await;
        }

        teardown_sources(&self.inner);
        *self.inner.state.write() = PipelineState::Stopping;
        let outcome = flush(&self.inner, force).await;
        *self.inner.state.write() = PipelineState::Stopped;

        info!(instance_id = %self.inner.instance_id, ?outcome, "capture closed");
        outcome
    }

    fn fetches_remote_config(&self) -> bool {
        fetches_remote_config(&self.inner.config)
    }

    fn start_timers(&self) {
        let config = &self.inner.config;
        let mut timers = self.inner.timers.lock();

        timers.push(spawn_timer(
            Arc::downgrade(&self.inner),
            config.flush_interval,
            |inner| async move {
                flush(&inner, false).await;
            },
        ));

        if self.fetches_remote_config() && !config.remote_config_fetch_interval.is_zero() {
            timers.push(spawn_timer(
                Arc::downgrade(&self.inner),
                config.remote_config_fetch_interval,
                |inner| async move {
                    if let Err(e) = refresh_config(&inner).await {
                        warn!(error = %e, "keeping previous endpoint config");
                    }
                },
            ));
        }
    }
}

fn fetches_remote_config(config: &CaptureConfig) -> bool {
    config.use_remote_config && !config.is_local_only()
}

/// Run `tick` every `period` while the instance is alive and running
///
/// The first tick fires one period after start. The task holds only a weak
/// reference so it never keeps a dropped instance alive.
fn spawn_timer<F, Fut>(inner: Weak<CaptureInner>, period: Duration, tick: F) -> JoinHandle<()>
where
    F: Fn(Arc<CaptureInner>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            if *inner.state.read() != PipelineState::Running {
                break;
            }
            tick(inner).await;
        }
    })
}

async fn refresh_config(inner: &CaptureInner) -> Result<()> {
    let payload = inner.transport.fetch_config().await?;
    let rules = RuleSet::from_payload(&payload);
    debug!(
        domains = rules.domains().len(),
        rules = rules.rule_count(),
        "endpoint config refreshed"
    );
    inner.rules.replace(rules);
    Ok(())
}

async fn flush(inner: &CaptureInner, force: bool) -> FlushOutcome {
    let _guard = inner.flush_lock.lock().await;

    if *inner.state.read() == PipelineState::Stopped {
        return FlushOutcome::Empty;
    }

    let stats = inner.cache.stats();
    let events = inner.cache.drain(force);
    if events.is_empty() {
        return FlushOutcome::Empty;
    }

    let rules = inner.rules.load();
    let batch = prepare_batch(events, &rules, &inner.config);
    if batch.is_empty() {
        return FlushOutcome::Empty;
    }
    let count = batch.len();

    if inner.config.is_local_only() {
        for event in &batch {
            debug!(event = %event, "captured event");
        }
        info!(count, "captured events logged locally");
        return FlushOutcome::LoggedLocally(count);
    }

    if inner.config.use_telemetry {
        let report = telemetry_report(inner, stats, count);
        if let Err(e) = inner.transport.post_telemetry(&report).await {
            debug!(error = %e, "telemetry not delivered");
        }
    }

    match inner.transport.post_events(&batch).await {
        Ok(()) => {
            info!(count, "delivered captured events");
            FlushOutcome::Delivered(count)
        }
        Err(e) if e.is_fatal() => {
            error!(error = %e, "collector rejected credentials, stopping capture");
            stop(inner);
            FlushOutcome::Unauthorized
        }
        Err(e) => {
            warn!(error = %e, count, "event delivery failed");
            let report = ErrorReport {
                message: "failed to deliver captured events".to_string(),
                payload: json!({ "count": count, "instanceId": inner.instance_id }),
                error: e.to_string(),
            };
            if let Err(report_err) = inner.transport.post_error(&report).await {
                debug!(error = %report_err, "error report not delivered");
            }

            match inner.fallback.write_batch(&batch) {
                Ok(path) => FlushOutcome::BackedUp { count, path },
                Err(write_err) => {
                    error!(error = %write_err, count, "failed to persist undelivered events");
                    FlushOutcome::Dropped(count)
                }
            }
        }
    }
}

fn telemetry_report(inner: &CaptureInner, stats: CacheStats, batch_size: usize) -> TelemetryReport {
    let mut metadata = Map::new();
    metadata.insert("instanceId".into(), json!(inner.instance_id));
    metadata.insert("sdkVersion".into(), json!(env!("CARGO_PKG_VERSION")));
    metadata.insert("batchSize".into(), json!(batch_size));
    metadata.insert("approxBytes".into(), json!(stats.approx_bytes));
    if let Some(service) = &inner.config.service_name {
        metadata.insert("serviceName".into(), Value::String(service.clone()));
    }

    TelemetryReport {
        cache_size: stats.total(),
        cache_keys: stats.keys,
        metadata,
    }
}

/// Terminal stop after an authorization failure
///
/// Runs under `flush_lock`, so no other flush is mid-delivery when the timers
/// are aborted.
fn stop(inner: &CaptureInner) {
    *inner.state.write() = PipelineState::Stopped;
    abort_timers(inner);
    teardown_sources(inner);

    let discarded = inner.cache.drain(true).len();
    if discarded > 0 {
        warn!(discarded, "discarding cached events after authorization failure");
    }
}

/// Abort the timers once no flush is in progress
///
/// A timer aborted mid-flush would take the batch it already drained with it.
async fn stop_timers(inner: &CaptureInner) {
    let _guard = inner.flush_lock.lock().await;
    abort_timers(inner);
}

fn abort_timers(inner: &CaptureInner) {
    for handle in inner.timers.lock().drain(..) {
        handle.abort();
    }
}

fn teardown_sources(inner: &CaptureInner) {
    for source in inner.sources.lock().drain(..) {
        debug!(source = source.name(), "tearing down observation source");
        source.teardown();
    }
}
