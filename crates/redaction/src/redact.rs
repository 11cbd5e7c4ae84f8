//! In-place redaction of captured events
//!
//! Redacted values are replaced with `null` and described by a
//! [`RedactionMeta`] entry so the collector knows what was removed without
//! seeing it. Null and empty values are never redacted, which makes a second
//! pass over an already redacted event a no-op.

use crate::expand::{expand_paths, leaf_paths};
use crate::keypath::{ConcreteKeyPath, Step};
use serde_json::Value;
use wiretap_config::{KeyAction, RedactionMode, SensitiveKeyRule};
use wiretap_core::{EventRecord, RedactionMeta, ValueKind};

/// Redact `event` according to `mode` and the matched rule's sensitive keys
///
/// Returns the redacted event with the new metadata appended to
/// `metadata.sensitive_keys`, plus the metadata produced by this pass.
pub fn redact(
    mut event: EventRecord,
    sensitive_keys: &[SensitiveKeyRule],
    mode: RedactionMode,
) -> (EventRecord, Vec<RedactionMeta>) {
    let meta = redact_in_place(&mut event, sensitive_keys, mode);
    event.metadata.sensitive_keys.extend(meta.iter().cloned());
    (event, meta)
}

/// Redact `event` in place, returning one metadata entry per redacted value
pub fn redact_in_place(
    event: &mut EventRecord,
    sensitive_keys: &[SensitiveKeyRule],
    mode: RedactionMode,
) -> Vec<RedactionMeta> {
    let targets = resolve_targets(event, sensitive_keys, mode);
    targets
        .iter()
        .filter_map(|path| redact_path(event, path))
        .collect()
}

/// Concrete paths to redact under the given policy
pub fn resolve_targets(
    event: &EventRecord,
    sensitive_keys: &[SensitiveKeyRule],
    mode: RedactionMode,
) -> Vec<ConcreteKeyPath> {
    match mode {
        RedactionMode::ForceRedactAll => leaf_paths(event, KeyAction::Redact),
        RedactionMode::RedactByDefault => {
            let allowed: Vec<ConcreteKeyPath> = expand_paths(event, sensitive_keys)
                .into_iter()
                .filter(|path| path.action == KeyAction::Allow)
                .collect();
            leaf_paths(event, KeyAction::Redact)
                .into_iter()
                .filter(|leaf| !allowed.iter().any(|allow| allow.covers(leaf)))
                .collect()
        }
        RedactionMode::Explicit => {
            if sensitive_keys.is_empty() {
                return Vec::new();
            }
            expand_paths(event, sensitive_keys)
                .into_iter()
                .filter(|path| path.action == KeyAction::Redact)
                .collect()
        }
    }
}

/// Null out the value at `path`, if there is a non-empty one
pub fn redact_path(event: &mut EventRecord, path: &ConcreteKeyPath) -> Option<RedactionMeta> {
    let root = event.section_mut(path.section)?;
    let slot = value_at_mut(root, &path.steps)?;
    if is_empty(slot) {
        return None;
    }

    let meta = RedactionMeta {
        key_path: path.external(),
        kind: ValueKind::of(slot),
        length: value_length(slot),
    };
    *slot = Value::Null;
    Some(meta)
}

fn value_at_mut<'a>(root: &'a mut Value, steps: &[Step]) -> Option<&'a mut Value> {
    steps.iter().try_fold(root, |current, step| match step {
        Step::Key(key) => current.as_object_mut()?.get_mut(key),
        Step::Index(index) => current.as_array_mut()?.get_mut(*index),
    })
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Size of a value in the unit that fits its type
///
/// Arrays count elements, objects their encoded byte length, strings their
/// characters, numbers their digits and booleans count as one.
pub fn value_length(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Array(items) => items.len(),
        Value::Object(_) => serde_json::to_string(value).map(|s| s.len()).unwrap_or(0),
        Value::String(s) => s.chars().count(),
        Value::Number(n) => n.to_string().chars().filter(char::is_ascii_digit).count(),
        Value::Bool(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiretap_core::{RequestRecord, ResponseRecord};

    fn event() -> EventRecord {
        let url = url::Url::parse("https://api.example.com/users").unwrap();
        let request = RequestRecord::new(
            "id-1",
            "POST",
            &url,
            json!({"authorization": "Bearer abc", "accept": "application/json"}),
            json!({"name": "Ada", "password": "hunter2", "cards": [{"pan": "4111111111111111"}, {"pan": "4222"}]}),
        );
        let response = ResponseRecord::new(
            201,
            "Created",
            json!({"content-type": "application/json"}),
            json!({"id": 42, "balance": -10.25, "active": true, "profile": {"ssn": "123"}}),
        );
        EventRecord::completed(request, response)
    }

    #[test]
    fn test_explicit_redaction_with_metadata() {
        let rules = [
            SensitiveKeyRule::redact("requestBody.password"),
            SensitiveKeyRule::redact("requestBody.cards[*].pan"),
            SensitiveKeyRule::redact("responseBody.profile"),
            SensitiveKeyRule::redact("responseBody.balance"),
            SensitiveKeyRule::redact("responseBody.active"),
            SensitiveKeyRule::allow("responseBody.id"),
        ];
        let (redacted, meta) = redact(event(), &rules, RedactionMode::Explicit);

        assert_eq!(redacted.request.body["password"], Value::Null);
        assert_eq!(redacted.request.body["cards"][0]["pan"], Value::Null);
        assert_eq!(redacted.request.body["name"], json!("Ada"));
        assert_eq!(redacted.response.as_ref().unwrap().body["id"], json!(42));

        let expected = vec![
            ("requestBody.password", ValueKind::String, 7),
            ("requestBody.cards[0].pan", ValueKind::String, 16),
            ("requestBody.cards[1].pan", ValueKind::String, 4),
            ("responseBody.profile", ValueKind::Object, r#"{"ssn":"123"}"#.len()),
            ("responseBody.balance", ValueKind::Float, 4),
            ("responseBody.active", ValueKind::Boolean, 1),
        ];
        let actual: Vec<_> = meta
            .iter()
            .map(|m| (m.key_path.as_str(), m.kind, m.length))
            .collect();
        assert_eq!(actual, expected);
        assert_eq!(redacted.metadata.sensitive_keys, meta);
    }

    #[test]
    fn test_redaction_is_idempotent() {
        let rules = [
            SensitiveKeyRule::redact("requestBody.password"),
            SensitiveKeyRule::redact("requestHeaders.authorization"),
        ];
        let (once, first) = redact(event(), &rules, RedactionMode::Explicit);
        let (twice, second) = redact(once.clone(), &rules, RedactionMode::Explicit);

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_force_redact_all_covers_every_leaf() {
        let (redacted, meta) = redact(event(), &[], RedactionMode::ForceRedactAll);

        // 2 request headers, name + password + 2 pans, 1 response header, 4 response leaves
        assert_eq!(meta.len(), 2 + 4 + 1 + 4);
        assert_eq!(redacted.request.headers["authorization"], Value::Null);
        assert_eq!(redacted.request.body["name"], Value::Null);
        assert_eq!(redacted.response.as_ref().unwrap().body["profile"]["ssn"], Value::Null);
        assert!(meta.iter().any(|m| m.key_path == "responseBody.profile.ssn"));
    }

    #[test]
    fn test_redact_by_default_keeps_allowed_paths() {
        let rules = [
            SensitiveKeyRule::allow("responseBody.id"),
            SensitiveKeyRule::allow("requestBody.cards"),
        ];
        let (redacted, meta) = redact(event(), &rules, RedactionMode::RedactByDefault);
        let response = redacted.response.as_ref().unwrap();

        assert_eq!(response.body["id"], json!(42));
        assert_eq!(response.body["balance"], Value::Null);
        assert_eq!(response.body["active"], Value::Null);
        assert_eq!(redacted.request.body["cards"][1]["pan"], json!("4222"));
        assert_eq!(redacted.request.body["password"], Value::Null);
        assert!(!meta.iter().any(|m| m.key_path.starts_with("requestBody.cards")));
    }

    #[test]
    fn test_missing_path_leaves_event_untouched() {
        let original = event();
        let (redacted, meta) = redact(
            original.clone(),
            &[SensitiveKeyRule::redact("responseBody.does.not[3].exist")],
            RedactionMode::Explicit,
        );
        assert!(meta.is_empty());
        assert_eq!(redacted, original);
    }

    #[test]
    fn test_no_rules_means_no_redaction() {
        let original = event();
        let (redacted, meta) = redact(original.clone(), &[], RedactionMode::Explicit);
        assert!(meta.is_empty());
        assert_eq!(redacted, original);
    }

    #[test]
    fn test_value_length() {
        assert_eq!(value_length(&json!([1, 2, 3])), 3);
        assert_eq!(value_length(&json!({"a": 1})), 7);
        assert_eq!(value_length(&json!("héllo")), 5);
        assert_eq!(value_length(&json!(-1234)), 4);
        assert_eq!(value_length(&json!(3.5)), 2);
        assert_eq!(value_length(&json!(false)), 1);
    }
}
