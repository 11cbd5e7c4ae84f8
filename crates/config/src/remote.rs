//! Remote endpoint configuration
//!
//! The collector serves a per-domain list of endpoint rules. The wire shape
//! (`RemoteConfigPayload`) is compiled into a `RuleSet` once per fetch:
//! regexes are built up front and malformed entries are dropped with a
//! warning, so matching never has to handle bad input.
//!
//! A `SharedRules` handle holds the active set behind an `Arc`. Refreshes
//! build a whole new set and swap the pointer; readers clone the `Arc` and
//! never see a partially applied update.

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};
use wiretap_core::{Error, Result};

/// Body of `GET {configUrl}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigPayload {
    #[serde(default)]
    pub endpoint_config: Vec<DomainConfig>,
    /// Passed through untouched; proxy rewriting happens outside the pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    pub domain: String,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    #[serde(default)]
    pub method: String,
    pub matching_regex: MatchingRegex,
    #[serde(default)]
    pub endpoint_configuration: EndpointConfiguration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingRegex {
    pub regex: String,
    pub location: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfiguration {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub sensitive_keys: Vec<SensitiveKeyRule>,
}

/// What to do with the value at a key path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyAction {
    #[default]
    #[serde(rename = "REDACT", alias = "Redact", alias = "redact")]
    Redact,
    #[serde(rename = "ALLOW", alias = "Allow", alias = "allow")]
    Allow,
}

/// One redaction directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitiveKeyRule {
    pub key_path: String,
    #[serde(default)]
    pub action: KeyAction,
}

impl SensitiveKeyRule {
    pub fn redact(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            action: KeyAction::Redact,
        }
    }

    pub fn allow(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            action: KeyAction::Allow,
        }
    }
}

/// Which part of a request an endpoint regex is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchLocation {
    Domain,
    Url,
    Path,
    RequestHeaders,
    RequestBody,
}

impl FromStr for MatchLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "domain" | "subdomain" | "host" => Ok(MatchLocation::Domain),
            "url" => Ok(MatchLocation::Url),
            "path" => Ok(MatchLocation::Path),
            "requestHeaders" | "request_headers" | "headers" | "header" => {
                Ok(MatchLocation::RequestHeaders)
            }
            "requestBody" | "request_body" | "body" => Ok(MatchLocation::RequestBody),
            other => Err(Error::configuration(format!(
                "unknown match location '{other}'"
            ))),
        }
    }
}

/// A compiled endpoint rule
#[derive(Debug, Clone)]
pub struct EndpointRule {
    pub method: String,
    pub location: MatchLocation,
    pub regex: Regex,
    /// Events matching this rule are dropped before caching
    pub ignored: bool,
    pub sensitive_keys: Vec<SensitiveKeyRule>,
}

impl EndpointRule {
    pub fn compile(endpoint: &EndpointConfig) -> Result<Self> {
        let location = endpoint.matching_regex.location.parse()?;
        let regex = Regex::new(&endpoint.matching_regex.regex).map_err(|e| {
            Error::configuration(format!(
                "invalid endpoint regex '{}': {e}",
                endpoint.matching_regex.regex
            ))
        })?;
        Ok(Self {
            method: endpoint.method.to_ascii_uppercase(),
            location,
            regex,
            ignored: endpoint
                .endpoint_configuration
                .action
                .eq_ignore_ascii_case("ignore"),
            sensitive_keys: endpoint.endpoint_configuration.sensitive_keys.clone(),
        })
    }
}

/// All rules for hosts containing `domain`
#[derive(Debug, Clone)]
pub struct DomainRules {
    pub domain: String,
    pub rules: Vec<EndpointRule>,
}

/// The complete compiled rule set, in collector order
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    domains: Vec<DomainRules>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile wire config, skipping entries that cannot be used
    pub fn compile(domains: &[DomainConfig]) -> Self {
        let domains = domains
            .iter()
            .filter(|d| !d.domain.is_empty())
            .map(|domain| {
                let rules = domain
                    .endpoints
                    .iter()
                    .filter_map(|endpoint| match EndpointRule::compile(endpoint) {
                        Ok(rule) => Some(rule),
                        Err(e) => {
                            warn!(domain = %domain.domain, error = %e, "skipping endpoint rule");
                            None
                        }
                    })
                    .collect();
                DomainRules {
                    domain: domain.domain.clone(),
                    rules,
                }
            })
            .collect::<Vec<_>>();

        debug!(domains = domains.len(), "compiled endpoint rule set");
        Self { domains }
    }

    pub fn from_payload(payload: &RemoteConfigPayload) -> Self {
        Self::compile(&payload.endpoint_config)
    }

    pub fn domains(&self) -> &[DomainRules] {
        &self.domains
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.domains.iter().map(|d| d.rules.len()).sum()
    }
}

/// Shared handle to the active rule set
#[derive(Debug, Default)]
pub struct SharedRules {
    current: RwLock<Arc<RuleSet>>,
}

impl SharedRules {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(rules)),
        }
    }

    /// Snapshot of the active set; stays valid across later swaps
    pub fn load(&self) -> Arc<RuleSet> {
        self.current.read().clone()
    }

    /// Replace the active set as a whole
    pub fn replace(&self, rules: RuleSet) {
        *self.current.write() = Arc::new(rules);
    }
}
