//! Capture pipeline configuration
//!
//! `CaptureConfig` is the single source of truth for one pipeline instance.
//! It is immutable after construction and cheap to clone into background
//! tasks. Values come from `Default`, then `CaptureConfigBuilder` or
//! `CaptureConfig::from_env`.

use crate::remote::DomainConfig;
use base64::Engine;
use std::path::PathBuf;
use std::time::Duration;
use wiretap_core::{constants::*, Error, Result};

/// Client id/secret pair used to authenticate with the collector
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Sentinel credentials that keep every event on this machine
    pub fn local() -> Self {
        Self::new(LOCAL_CLIENT_ID, LOCAL_CLIENT_SECRET)
    }

    /// Read `WIRETAP_CLIENT_ID` and `WIRETAP_CLIENT_SECRET`
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::configuration(format!("{name} is not set")))
        };
        Ok(Self::new(
            read(WIRETAP_CLIENT_ID_VAR)?,
            read(WIRETAP_CLIENT_SECRET_VAR)?,
        ))
    }

    /// Whether these are the local-only sentinel values
    pub fn is_local(&self) -> bool {
        self.client_id == LOCAL_CLIENT_ID && self.client_secret == LOCAL_CLIENT_SECRET
    }

    /// Value for the `Authorization` header
    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.client_id, self.client_secret);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}

/// Which redaction policy applies to captured events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedactionMode {
    /// Redact every leaf of request/response headers and bodies
    ForceRedactAll,
    /// Redact every leaf except explicitly allowed paths
    RedactByDefault,
    /// Redact only paths explicitly marked for redaction
    #[default]
    Explicit,
}

/// Configuration for one capture pipeline instance
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub credentials: Credentials,
    /// Collector base URL; config, event and error endpoints hang off it
    pub base_url: String,
    pub telemetry_url: String,
    pub config_fetch_endpoint: String,
    pub event_sink_endpoint: String,
    pub error_sink_endpoint: String,
    pub telemetry_endpoint: String,
    pub flush_interval: Duration,
    pub remote_config_fetch_interval: Duration,
    /// Pending or completed entries older than this are evicted on access
    pub cache_ttl: Option<Duration>,
    /// Grace period on close while responses are still outstanding
    pub wait_after_close: Duration,
    /// Per-call timeout for every collector request
    pub request_timeout: Duration,
    pub use_remote_config: bool,
    pub use_telemetry: bool,
    pub force_redact_all: bool,
    pub redact_by_default: bool,
    pub log_request_headers: bool,
    pub log_request_body: bool,
    pub log_response_headers: bool,
    pub log_response_body: bool,
    /// Only capture requests issued inside this instance's own scope
    pub instance_scoped: bool,
    /// Where undeliverable batches are dumped
    pub fallback_dir: PathBuf,
    /// Reported to the telemetry sink with every batch
    pub service_name: Option<String>,
    /// Rule set used until (or instead of) the first remote fetch
    pub default_endpoint_config: Vec<DomainConfig>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::local(),
            base_url: DEFAULT_BASE_URL.to_string(),
            telemetry_url: DEFAULT_TELEMETRY_URL.to_string(),
            config_fetch_endpoint: CONFIG_FETCH_ENDPOINT.to_string(),
            event_sink_endpoint: EVENT_SINK_ENDPOINT.to_string(),
            error_sink_endpoint: ERROR_SINK_ENDPOINT.to_string(),
            telemetry_endpoint: TELEMETRY_ENDPOINT.to_string(),
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            remote_config_fetch_interval: Duration::from_millis(
                DEFAULT_REMOTE_CONFIG_FETCH_INTERVAL_MS,
            ),
            cache_ttl: None,
            wait_after_close: Duration::from_millis(DEFAULT_WAIT_AFTER_CLOSE_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            use_remote_config: true,
            use_telemetry: true,
            force_redact_all: false,
            redact_by_default: false,
            log_request_headers: true,
            log_request_body: true,
            log_response_headers: true,
            log_response_body: true,
            instance_scoped: false,
            fallback_dir: std::env::temp_dir().join("wiretap"),
            service_name: None,
            default_endpoint_config: Vec::new(),
        }
    }
}

impl CaptureConfig {
    /// Start a builder from defaults
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder::new()
    }

    /// Defaults overridden by `WIRETAP_*` environment variables
    ///
    /// Credentials are required; everything else is optional.
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            credentials: Credentials::from_env()?,
            ..Self::default()
        };

        if let Ok(url) = std::env::var(WIRETAP_BASE_URL_VAR) {
            config.base_url = url;
        }
        if let Ok(url) = std::env::var(WIRETAP_TELEMETRY_URL_VAR) {
            config.telemetry_url = url;
        }
        if let Ok(raw) = std::env::var(WIRETAP_FLUSH_INTERVAL_VAR) {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                Error::configuration(format!(
                    "{WIRETAP_FLUSH_INTERVAL_VAR} must be a number of milliseconds, got '{raw}'"
                ))
            })?;
            config.flush_interval = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.credentials.client_id.is_empty() || self.credentials.client_secret.is_empty() {
            return Err(Error::configuration(
                "client id and client secret must both be set",
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(Error::configuration("flush interval must be non-zero"));
        }
        for base in [&self.base_url, &self.telemetry_url] {
            url::Url::parse(base)
                .map_err(|e| Error::configuration(format!("invalid collector URL '{base}': {e}")))?;
        }
        Ok(())
    }

    /// The effective redaction mode; `force_redact_all` outranks `redact_by_default`
    pub fn redaction_mode(&self) -> RedactionMode {
        if self.force_redact_all {
            RedactionMode::ForceRedactAll
        } else if self.redact_by_default {
            RedactionMode::RedactByDefault
        } else {
            RedactionMode::Explicit
        }
    }

    pub fn is_local_only(&self) -> bool {
        self.credentials.is_local()
    }

    pub fn config_url(&self) -> String {
        join_url(&self.base_url, &self.config_fetch_endpoint)
    }

    pub fn event_sink_url(&self) -> String {
        join_url(&self.base_url, &self.event_sink_endpoint)
    }

    pub fn error_sink_url(&self) -> String {
        join_url(&self.base_url, &self.error_sink_endpoint)
    }

    pub fn telemetry_sink_url(&self) -> String {
        join_url(&self.telemetry_url, &self.telemetry_endpoint)
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Builder for creating capture configurations
pub struct CaptureConfigBuilder {
    config: CaptureConfig,
}

impl CaptureConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CaptureConfig::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn with_telemetry_url(mut self, url: impl Into<String>) -> Self {
        self.config.telemetry_url = url.into();
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    pub fn with_remote_config_fetch_interval(mut self, interval: Duration) -> Self {
        self.config.remote_config_fetch_interval = interval;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = Some(ttl);
        self
    }

    pub fn with_wait_after_close(mut self, wait: Duration) -> Self {
        self.config.wait_after_close = wait;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn with_remote_config(mut self, enabled: bool) -> Self {
        self.config.use_remote_config = enabled;
        self
    }

    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.config.use_telemetry = enabled;
        self
    }

    pub fn with_force_redact_all(mut self, enabled: bool) -> Self {
        self.config.force_redact_all = enabled;
        self
    }

    pub fn with_redact_by_default(mut self, enabled: bool) -> Self {
        self.config.redact_by_default = enabled;
        self
    }

    /// Toggle which parts of each exchange are delivered at all
    pub fn with_logging(
        mut self,
        request_headers: bool,
        request_body: bool,
        response_headers: bool,
        response_body: bool,
    ) -> Self {
        self.config.log_request_headers = request_headers;
        self.config.log_request_body = request_body;
        self.config.log_response_headers = response_headers;
        self.config.log_response_body = response_body;
        self
    }

    pub fn with_instance_scoped(mut self, enabled: bool) -> Self {
        self.config.instance_scoped = enabled;
        self
    }

    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.fallback_dir = dir.into();
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = Some(name.into());
        self
    }

    pub fn with_default_endpoint_config(mut self, domains: Vec<DomainConfig>) -> Self {
        self.config.default_endpoint_config = domains;
        self
    }

    pub fn build(self) -> Result<CaptureConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for CaptureConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_are_local_only() {
        let config = CaptureConfig::default();
        assert!(config.is_local_only());
        assert_eq!(config.flush_interval, Duration::from_secs(1));
        assert_eq!(config.redaction_mode(), RedactionMode::Explicit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_force_redact_all_outranks_redact_by_default() {
        let config = CaptureConfig::builder()
            .with_force_redact_all(true)
            .with_redact_by_default(true)
            .build()
            .unwrap();
        assert_eq!(config.redaction_mode(), RedactionMode::ForceRedactAll);
    }

    #[test]
    fn test_endpoint_urls() {
        let config = CaptureConfig::builder()
            .with_base_url("https://collector.internal/")
            .build()
            .unwrap();
        assert_eq!(config.event_sink_url(), "https://collector.internal/events");
        assert_eq!(config.config_url(), "https://collector.internal/config");
        assert_eq!(
            config.telemetry_sink_url(),
            "https://telemetry.wiretap.dev/telemetry"
        );
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(CaptureConfig::builder()
            .with_flush_interval(Duration::ZERO)
            .build()
            .is_err());
        assert!(CaptureConfig::builder()
            .with_base_url("not a url")
            .build()
            .is_err());
        assert!(CaptureConfig::builder()
            .with_credentials(Credentials::new("", "secret"))
            .build()
            .is_err());
    }

    #[test]
    fn test_basic_auth_header() {
        let creds = Credentials::new("id", "secret");
        assert_eq!(creds.basic_auth_header(), "Basic aWQ6c2VjcmV0");
        assert!(!format!("{creds:?}").contains("\"secret\""));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var(WIRETAP_CLIENT_ID_VAR, "client");
        std::env::set_var(WIRETAP_CLIENT_SECRET_VAR, "shh");
        std::env::set_var(WIRETAP_FLUSH_INTERVAL_VAR, "250");
        std::env::set_var(WIRETAP_BASE_URL_VAR, "http://localhost:9000");

        let config = CaptureConfig::from_env().unwrap();
        assert_eq!(config.credentials, Credentials::new("client", "shh"));
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.event_sink_url(), "http://localhost:9000/events");
        assert!(!config.is_local_only());

        std::env::set_var(WIRETAP_FLUSH_INTERVAL_VAR, "soon");
        assert!(CaptureConfig::from_env().is_err());

        for var in [
            WIRETAP_CLIENT_ID_VAR,
            WIRETAP_CLIENT_SECRET_VAR,
            WIRETAP_FLUSH_INTERVAL_VAR,
            WIRETAP_BASE_URL_VAR,
        ] {
            std::env::remove_var(var);
        }
        assert!(CaptureConfig::from_env().is_err());
    }
}
