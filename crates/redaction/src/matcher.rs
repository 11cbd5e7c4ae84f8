//! Endpoint rule selection
//!
//! The first domain whose key is a substring of the request host owns the
//! request; within it, the first rule (in collector order) whose method and
//! location regex both match wins. No domain and no rule both mean "no
//! policy": the event is captured with default behaviour, not ignored and not
//! fully redacted.

use std::borrow::Cow;
use wiretap_config::{EndpointRule, MatchLocation, RuleSet};
use wiretap_core::RequestRecord;

/// What the pipeline should do with a request
#[derive(Debug, Clone, Copy)]
pub enum EndpointDecision<'a> {
    /// Drop before caching or redaction
    Ignore,
    /// Capture, redacting with the matched rule when there is one
    Capture(Option<&'a EndpointRule>),
}

impl<'a> EndpointDecision<'a> {
    pub fn is_ignored(&self) -> bool {
        matches!(self, EndpointDecision::Ignore)
    }

    pub fn rule(&self) -> Option<&'a EndpointRule> {
        match self {
            EndpointDecision::Capture(rule) => *rule,
            EndpointDecision::Ignore => None,
        }
    }
}

/// Find the endpoint rule governing `request`
pub fn match_endpoint<'a>(request: &RequestRecord, rules: &'a RuleSet) -> Option<&'a EndpointRule> {
    let domain = rules
        .domains()
        .iter()
        .find(|domain| request.host.contains(domain.domain.as_str()))?;

    domain.rules.iter().find(|rule| {
        rule.method.eq_ignore_ascii_case(&request.method)
            && rule.regex.is_match(&location_value(request, rule.location))
    })
}

/// Decide between ignoring and capturing `request`
pub fn decide<'a>(request: &RequestRecord, rules: &'a RuleSet) -> EndpointDecision<'a> {
    match match_endpoint(request, rules) {
        Some(rule) if rule.ignored => EndpointDecision::Ignore,
        rule => EndpointDecision::Capture(rule),
    }
}

/// The string a rule's regex is evaluated against
pub fn location_value(request: &RequestRecord, location: MatchLocation) -> Cow<'_, str> {
    match location {
        MatchLocation::Domain => Cow::Borrowed(&request.host),
        MatchLocation::Url => Cow::Borrowed(&request.url),
        MatchLocation::Path => Cow::Borrowed(&request.path),
        MatchLocation::RequestHeaders => Cow::Owned(request.headers.to_string()),
        MatchLocation::RequestBody => match request.body.as_str() {
            Some(raw) => Cow::Borrowed(raw),
            None => Cow::Owned(request.body.to_string()),
        },
    }
}
