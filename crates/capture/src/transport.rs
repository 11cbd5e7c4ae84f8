//! Collector transport
//!
//! The pipeline talks to the collector through the [`Transport`] trait so
//! tests and embedders can substitute their own delivery. [`HttpTransport`]
//! is the production implementation over `reqwest`.

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;
use wiretap_config::{CaptureConfig, RemoteConfigPayload};
use wiretap_core::{Error, Result};

/// Body of `POST {errorSinkUrl}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub message: String,
    pub payload: Value,
    pub error: String,
}

/// Body of `POST {telemetryUrl}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReport {
    pub cache_keys: Vec<String>,
    pub cache_size: usize,
    /// Static metadata flattened into the top-level object
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Remote side of the pipeline
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the endpoint rules
    async fn fetch_config(&self) -> Result<RemoteConfigPayload>;

    /// Deliver one batch of redacted events
    ///
    /// A 401 must surface as [`Error::Authorization`]; the pipeline stops on
    /// it instead of falling back to disk.
    async fn post_events(&self, events: &[Value]) -> Result<()>;

    async fn post_error(&self, report: &ErrorReport) -> Result<()>;

    async fn post_telemetry(&self, report: &TelemetryReport) -> Result<()>;
}

/// `reqwest`-backed transport with Basic auth and a per-request timeout
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    authorization: String,
    timeout: Duration,
    config_url: String,
    event_sink_url: String,
    error_sink_url: String,
    telemetry_url: String,
}

impl HttpTransport {
    pub fn new(config: &CaptureConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("wiretap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            authorization: config.credentials.basic_auth_header(),
            timeout: config.request_timeout,
            config_url: config.config_url(),
            event_sink_url: config.event_sink_url(),
            error_sink_url: config.error_sink_url(),
            telemetry_url: config.telemetry_sink_url(),
        })
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        count: usize,
    ) -> Result<()> {
        let response = self
            .client
            .post(url)
            .header(header::AUTHORIZATION, &self.authorization)
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error(url, count, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::authorization(url));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::delivery(
                url,
                count,
                Some(status.as_u16()),
                format!("{status}: {text}"),
            ));
        }

        debug!(url, count, status = status.as_u16(), "posted to collector");
        Ok(())
    }

    fn request_error(&self, url: &str, count: usize, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::timeout(format!("POST {url}"), self.timeout)
        } else {
            Error::delivery(url, count, None, error.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_config(&self) -> Result<RemoteConfigPayload> {
        let url = self.config_url.as_str();
        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(format!("GET {url}"), self.timeout)
                } else {
                    Error::config_fetch(url, e.to_string())
                }
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(Error::authorization(url)),
            status if !status.is_success() => {
                Err(Error::config_fetch(url, format!("unexpected status {status}")))
            }
            _ => response
                .json::<RemoteConfigPayload>()
                .await
                .map_err(|e| Error::config_fetch(url, format!("invalid config payload: {e}"))),
        }
    }

    async fn post_events(&self, events: &[Value]) -> Result<()> {
        self.post_json(&self.event_sink_url, events, events.len())
            .await
    }

    async fn post_error(&self, report: &ErrorReport) -> Result<()> {
        self.post_json(&self.error_sink_url, report, 0).await
    }

    async fn post_telemetry(&self, report: &TelemetryReport) -> Result<()> {
        self.post_json(&self.telemetry_url, report, 0).await
    }
}
