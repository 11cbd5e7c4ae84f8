//! Outbound HTTP traffic capture
//!
//! The interception layer reports each request and response to a [`Capture`]
//! instance under a correlation id. The instance pairs them in a cache,
//! tags them with the caller's capture scope, redacts sensitive fields
//! according to local and remotely fetched endpoint rules, and periodically
//! delivers batches to the collector. Batches the collector does not accept
//! are written to a local fallback directory.
//!
//! ```no_run
//! use wiretap::{Capture, CaptureConfig, RequestParts, ResponseParts};
//!
//! # async fn run() -> wiretap::Result<()> {
//! let capture = Capture::new(CaptureConfig::from_env()?)?;
//! capture.init().await?;
//!
//! capture.observe_request("req-1", RequestParts::new("GET", "https://api.example.com/posts"));
//! capture.observe_response("req-1", ResponseParts::new(200).body(r#"{"posts":[]}"#));
//!
//! capture.close(true).await;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod fallback;
pub mod flush;
pub mod observer;
pub mod state;
pub mod transport;

pub use capture::Capture;
pub use fallback::FallbackWriter;
pub use observer::{ObservationSource, RequestParts, ResponseParts};
pub use state::{FlushOutcome, PipelineState};
pub use transport::{ErrorReport, HttpTransport, TelemetryReport, Transport};

pub use wiretap_config::{CaptureConfig, CaptureConfigBuilder, Credentials, DomainConfig};
pub use wiretap_core::{context, Error, EventRecord, RequestRecord, ResponseRecord, Result, Tags};
pub use wiretap_utils::init_tracing;
