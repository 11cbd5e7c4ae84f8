use std::path::PathBuf;

/// Result type alias for wiretap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for wiretap operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An observed request or response could not be turned into a record
    #[error("failed to cache observed {stage} '{correlation_id}': {message}")]
    Caching {
        correlation_id: String,
        stage: &'static str,
        message: String,
    },

    /// Remote configuration could not be fetched or parsed
    #[error("failed to fetch remote config from '{endpoint}': {message}")]
    ConfigFetch { endpoint: String, message: String },

    /// Posting a batch failed for a reason other than authorization
    #[error("failed to deliver {count} events to '{endpoint}': {message}")]
    Delivery {
        endpoint: String,
        count: usize,
        status: Option<u16>,
        message: String,
    },

    /// The collector rejected our credentials
    #[error("authorization rejected by '{endpoint}': invalid client id or client secret")]
    Authorization { endpoint: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Operation timeout errors
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: std::time::Duration,
    },
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FileSystem {
            path: PathBuf::new(),
            operation: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

impl Error {
    /// Create a caching error for a request or response that could not be recorded
    #[must_use]
    pub fn caching(
        correlation_id: impl Into<String>,
        stage: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Error::Caching {
            correlation_id: correlation_id.into(),
            stage,
            message: message.into(),
        }
    }

    /// Create a remote config fetch error
    #[must_use]
    pub fn config_fetch(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigFetch {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a delivery error
    #[must_use]
    pub fn delivery(
        endpoint: impl Into<String>,
        count: usize,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Error::Delivery {
            endpoint: endpoint.into(),
            count,
            status,
            message: message.into(),
        }
    }

    /// Create an authorization error
    #[must_use]
    pub fn authorization(endpoint: impl Into<String>) -> Self {
        Error::Authorization {
            endpoint: endpoint.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether this error must stop the pipeline instead of falling back
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Authorization { .. })
    }
}
