//! Configuration for the wiretap capture pipeline
//!
//! `config` holds the typed, locally supplied settings. `remote` models the
//! endpoint rules fetched from the collector and the shared handle they are
//! swapped through.

pub mod config;
pub mod remote;

pub use config::{CaptureConfig, CaptureConfigBuilder, Credentials, RedactionMode};
pub use remote::{
    DomainConfig, DomainRules, EndpointConfig, EndpointConfiguration, EndpointRule, KeyAction,
    MatchLocation, MatchingRegex, RemoteConfigPayload, RuleSet, SensitiveKeyRule, SharedRules,
};
