//! Turning drained cache entries into a deliverable batch

use serde_json::{json, Value};
use tracing::{debug, warn};
use wiretap_config::{CaptureConfig, RuleSet};
use wiretap_core::{EventRecord, Result, Section};
use wiretap_redaction::{decide, redact, EndpointDecision};

/// Redact every event and encode the survivors
///
/// Events that now match an ignore rule are dropped, and so is any event that
/// fails to encode; one bad event never costs the rest of the batch.
pub fn prepare_batch(events: Vec<EventRecord>, rules: &RuleSet, config: &CaptureConfig) -> Vec<Value> {
    events
        .into_iter()
        .filter_map(|event| {
            let id = event.id().to_string();
            match prepare_event(event, rules, config) {
                Ok(prepared) => prepared,
                Err(e) => {
                    warn!(correlation_id = %id, error = %e, "skipping event that could not be prepared");
                    None
                }
            }
        })
        .collect()
}

/// Redact one event; `Ok(None)` when its endpoint is ignored
pub fn prepare_event(
    mut event: EventRecord,
    rules: &RuleSet,
    config: &CaptureConfig,
) -> Result<Option<Value>> {
    let decision = decide(&event.request, rules);
    let rule = match decision {
        EndpointDecision::Ignore => {
            debug!(correlation_id = %event.id(), "dropping event for ignored endpoint");
            return Ok(None);
        }
        EndpointDecision::Capture(rule) => rule,
    };

    strip_disabled_sections(&mut event, config);

    let sensitive_keys = rule.map(|r| r.sensitive_keys.as_slice()).unwrap_or_default();
    let (event, redacted) = redact(event, sensitive_keys, config.redaction_mode());
    if !redacted.is_empty() {
        debug!(correlation_id = %event.id(), redacted = redacted.len(), "redacted event");
    }

    Ok(Some(serde_json::to_value(&event)?))
}

/// Blank out the sections the configuration says not to log
pub fn strip_disabled_sections(event: &mut EventRecord, config: &CaptureConfig) {
    let toggles = [
        (Section::RequestHeaders, config.log_request_headers),
        (Section::RequestBody, config.log_request_body),
        (Section::ResponseHeaders, config.log_response_headers),
        (Section::ResponseBody, config.log_response_body),
    ];

    for (section, enabled) in toggles {
        if enabled {
            continue;
        }
        if let Some(value) = event.section_mut(section) {
            *value = match section {
                Section::RequestHeaders | Section::ResponseHeaders => json!({}),
                Section::RequestBody | Section::ResponseBody => json!(""),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiretap_config::RemoteConfigPayload;
    use wiretap_core::{RequestRecord, ResponseRecord};

    fn rules() -> RuleSet {
        let payload: RemoteConfigPayload = serde_json::from_value(json!({
            "endpointConfig": [{
                "domain": "example.com",
                "endpoints": [
                    {
                        "method": "GET",
                        "matchingRegex": { "regex": "^/health$", "location": "path" },
                        "endpointConfiguration": { "action": "Ignore" }
                    },
                    {
                        "method": "POST",
                        "matchingRegex": { "regex": "^/login$", "location": "path" },
                        "endpointConfiguration": {
                            "action": "Accept",
                            "sensitiveKeys": [{ "keyPath": "requestBody.password", "action": "REDACT" }]
                        }
                    }
                ]
            }]
        }))
        .unwrap();
        RuleSet::from_payload(&payload)
    }

    fn event(method: &str, path: &str) -> EventRecord {
        let url = url::Url::parse(&format!("https://example.com{path}")).unwrap();
        let request = RequestRecord::new(
            "id",
            method,
            &url,
            json!({"cookie": "session=1"}),
            json!({"user": "ada", "password": "pw"}),
        );
        let response = ResponseRecord::new(200, "OK", json!({"set-cookie": "x"}), json!({"ok": true}));
        EventRecord::completed(request, response)
    }

    #[test]
    fn test_matched_rule_redacts() {
        let config = CaptureConfig::default();
        let value = prepare_event(event("POST", "/login"), &rules(), &config)
            .unwrap()
            .unwrap();

        assert_eq!(value["request"]["body"]["password"], Value::Null);
        assert_eq!(value["request"]["body"]["user"], json!("ada"));
        assert_eq!(
            value["metadata"]["sensitiveKeys"],
            json!([{ "keyPath": "requestBody.password", "type": "string", "length": 2 }])
        );
    }

    #[test]
    fn test_ignored_and_unmatched_events() {
        let config = CaptureConfig::default();
        assert!(prepare_event(event("GET", "/health"), &rules(), &config)
            .unwrap()
            .is_none());

        let untouched = prepare_event(event("GET", "/other"), &rules(), &config)
            .unwrap()
            .unwrap();
        assert_eq!(untouched["request"]["body"]["password"], json!("pw"));
        assert_eq!(untouched["metadata"]["sensitiveKeys"], json!([]));
    }

    #[test]
    fn test_disabled_sections_are_stripped_before_redaction() {
        let config = CaptureConfig::builder()
            .with_logging(false, true, true, false)
            .with_force_redact_all(true)
            .build()
            .unwrap();
        let batch = prepare_batch(vec![event("GET", "/other")], &RuleSet::empty(), &config);
        let value = &batch[0];

        assert_eq!(value["request"]["headers"], json!({}));
        assert_eq!(value["response"]["body"], json!(""));
        assert_eq!(value["request"]["body"]["user"], Value::Null);
        let paths: Vec<&str> = value["metadata"]["sensitiveKeys"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["keyPath"].as_str().unwrap())
            .collect();
        assert_eq!(
            paths,
            vec!["requestBody.user", "requestBody.password", "responseHeaders.set-cookie"]
        );
    }
}
