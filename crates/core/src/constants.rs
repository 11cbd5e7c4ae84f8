/// Constants used throughout the wiretap codebase
// Collector endpoints
pub const DEFAULT_BASE_URL: &str = "https://api.wiretap.dev";
pub const DEFAULT_TELEMETRY_URL: &str = "https://telemetry.wiretap.dev";
pub const CONFIG_FETCH_ENDPOINT: &str = "/config";
pub const EVENT_SINK_ENDPOINT: &str = "/events";
pub const ERROR_SINK_ENDPOINT: &str = "/errors";
pub const TELEMETRY_ENDPOINT: &str = "/telemetry";

// Sentinel credentials that switch the pipeline into local-only mode
pub const LOCAL_CLIENT_ID: &str = "local-client-id";
pub const LOCAL_CLIENT_SECRET: &str = "local-client-secret";

// Environment variable names
pub const WIRETAP_CLIENT_ID_VAR: &str = "WIRETAP_CLIENT_ID";
pub const WIRETAP_CLIENT_SECRET_VAR: &str = "WIRETAP_CLIENT_SECRET";
pub const WIRETAP_BASE_URL_VAR: &str = "WIRETAP_BASE_URL";
pub const WIRETAP_TELEMETRY_URL_VAR: &str = "WIRETAP_TELEMETRY_URL";
pub const WIRETAP_FLUSH_INTERVAL_VAR: &str = "WIRETAP_FLUSH_INTERVAL_MS";
pub const WIRETAP_LOG_VAR: &str = "WIRETAP_LOG";

// Timing defaults (milliseconds)
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_REMOTE_CONFIG_FETCH_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_WAIT_AFTER_CLOSE_MS: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

// Disk fallback file naming
pub const FALLBACK_FILE_PREFIX: &str = "wiretap";

// Sensitive key path prefixes, external vocabulary
pub const REQUEST_HEADERS_PREFIX: &str = "requestHeaders";
pub const REQUEST_BODY_PREFIX: &str = "requestBody";
pub const RESPONSE_HEADERS_PREFIX: &str = "responseHeaders";
pub const RESPONSE_BODY_PREFIX: &str = "responseBody";
