#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiretap::{
    CaptureConfig, CaptureConfigBuilder, Credentials, ErrorReport, ObservationSource,
    TelemetryReport, Transport,
};
use wiretap_config::RemoteConfigPayload;
use wiretap_core::{Error, Result};

/// How the mock collector answers event batches
#[derive(Debug, Clone, Copy)]
pub enum Answer {
    Accept,
    Unauthorized,
    Fail(u16),
}

/// In-memory collector that records everything it receives
pub struct MockTransport {
    pub config: Mutex<Option<RemoteConfigPayload>>,
    pub reply: Mutex<Answer>,
    pub batches: Mutex<Vec<Vec<Value>>>,
    pub errors: Mutex<Vec<ErrorReport>>,
    pub telemetry: Mutex<Vec<TelemetryReport>>,
    pub config_fetches: AtomicUsize,
    /// How long `post_events` takes before answering
    pub latency: Mutex<Duration>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(None),
            reply: Mutex::new(Answer::Accept),
            batches: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            telemetry: Mutex::new(Vec::new()),
            config_fetches: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
        })
    }

    pub fn with_config(config: Value) -> Arc<Self> {
        let mock = Self::new();
        mock.set_config(Some(config));
        mock
    }

    pub fn set_config(&self, config: Option<Value>) {
        *self.config.lock() = config.map(|c| serde_json::from_value(c).unwrap());
    }

    pub fn answer(&self, answer: Answer) {
        *self.reply.lock() = answer;
    }

    pub fn slow_down(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn delivered(&self) -> Vec<Value> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    pub fn event(&self, id: &str) -> Value {
        self.delivered()
            .into_iter()
            .find(|e| e["request"]["id"] == id)
            .unwrap_or_else(|| panic!("no delivered event with id {id}"))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch_config(&self) -> Result<RemoteConfigPayload> {
        self.config_fetches.fetch_add(1, Ordering::SeqCst);
        self.config
            .lock()
            .clone()
            .ok_or_else(|| Error::config_fetch("mock://config", "collector unavailable"))
    }

    async fn post_events(&self, events: &[Value]) -> Result<()> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.batches.lock().push(events.to_vec());
        match *self.reply.lock() {
            Answer::Accept => Ok(()),
            Answer::Unauthorized => Err(Error::authorization("mock://events")),
            Answer::Fail(status) => Err(Error::delivery(
                "mock://events",
                events.len(),
                Some(status),
                "Internal Server Error",
            )),
        }
    }

    async fn post_error(&self, report: &ErrorReport) -> Result<()> {
        self.errors.lock().push(report.clone());
        Ok(())
    }

    async fn post_telemetry(&self, report: &TelemetryReport) -> Result<()> {
        self.telemetry.lock().push(report.clone());
        Ok(())
    }
}

/// Observation source that remembers whether it was torn down
#[derive(Default)]
pub struct FlagSource {
    pub torn_down: Arc<AtomicBool>,
}

impl ObservationSource for FlagSource {
    fn name(&self) -> &str {
        "flag"
    }

    fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }
}

/// Remote credentials, timers far enough out that only explicit flushes run
pub fn config(fallback_dir: &Path) -> CaptureConfigBuilder {
    CaptureConfig::builder()
        .with_credentials(Credentials::new("client", "secret"))
        .with_flush_interval(Duration::from_secs(3600))
        .with_remote_config_fetch_interval(Duration::from_secs(3600))
        .with_wait_after_close(Duration::from_millis(10))
        .with_fallback_dir(fallback_dir)
}

pub fn endpoint(method: &str, regex: &str, action: &str, sensitive_keys: Value) -> Value {
    json!({
        "method": method,
        "matchingRegex": { "regex": regex, "location": "path" },
        "endpointConfiguration": { "action": action, "sensitiveKeys": sensitive_keys }
    })
}

pub fn domain(domain: &str, endpoints: Vec<Value>) -> Value {
    json!({ "endpointConfig": [{ "domain": domain, "endpoints": endpoints }] })
}
