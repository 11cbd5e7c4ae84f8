//! Expansion of key path patterns against concrete payloads

use crate::keypath::{ConcreteKeyPath, KeyPattern, Segment, Step};
use serde_json::Value;
use tracing::debug;
use wiretap_config::{KeyAction, SensitiveKeyRule};
use wiretap_core::{EventRecord, Section};

/// Resolve every rule against `event`, one concrete path per match
///
/// Wildcards fan out over every element of the array found at that point.
/// Branches that hit a missing key, a wrong container type or an
/// out-of-range index are dropped silently, as are rules that do not parse.
pub fn expand_paths(event: &EventRecord, rules: &[SensitiveKeyRule]) -> Vec<ConcreteKeyPath> {
    let mut out = Vec::new();

    for rule in rules {
        let Some(pattern) = KeyPattern::parse(&rule.key_path) else {
            debug!(key_path = %rule.key_path, "ignoring unparsable sensitive key path");
            continue;
        };
        let Some(root) = event.section(pattern.section) else {
            continue;
        };

        let mut found = Vec::new();
        expand_value(root, &pattern.segments, &mut Vec::new(), &mut found);
        out.extend(
            found
                .into_iter()
                .map(|steps| ConcreteKeyPath::new(pattern.section, steps, rule.action)),
        );
    }

    out
}

/// Expand `pattern` under `value`, appending each concrete step list to `out`
pub fn expand_value(
    value: &Value,
    pattern: &[Segment],
    prefix: &mut Vec<Step>,
    out: &mut Vec<Vec<Step>>,
) {
    let Some((head, rest)) = pattern.split_first() else {
        out.push(prefix.clone());
        return;
    };

    match head {
        Segment::Key(key) => {
            if let Some(child) = value.as_object().and_then(|map| map.get(key)) {
                prefix.push(Step::Key(key.clone()));
                expand_value(child, rest, prefix, out);
                prefix.pop();
            }
        }
        Segment::Index(index) => {
            if let Some(child) = value.as_array().and_then(|items| items.get(*index)) {
                prefix.push(Step::Index(*index));
                expand_value(child, rest, prefix, out);
                prefix.pop();
            }
        }
        Segment::Wildcard => {
            if let Some(items) = value.as_array() {
                for (index, child) in items.iter().enumerate() {
                    prefix.push(Step::Index(index));
                    expand_value(child, rest, prefix, out);
                    prefix.pop();
                }
            }
        }
    }
}

/// Every leaf of the request and response headers and bodies
///
/// A leaf is a scalar or an empty container. A section that is itself a
/// scalar (a raw text body) is reported as the section root.
pub fn leaf_paths(event: &EventRecord, action: KeyAction) -> Vec<ConcreteKeyPath> {
    let mut out = Vec::new();
    for section in Section::ALL {
        if let Some(root) = event.section(section) {
            let mut steps = Vec::new();
            collect_leaves(root, &mut steps, &mut |steps: &[Step]| {
                out.push(ConcreteKeyPath::new(section, steps.to_vec(), action));
            });
        }
    }
    out
}

fn collect_leaves(value: &Value, prefix: &mut Vec<Step>, emit: &mut dyn FnMut(&[Step])) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                prefix.push(Step::Key(key.clone()));
                collect_leaves(child, prefix, emit);
                prefix.pop();
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                prefix.push(Step::Index(index));
                collect_leaves(child, prefix, emit);
                prefix.pop();
            }
        }
        _ => emit(prefix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use wiretap_core::{RequestRecord, ResponseRecord};

    fn event(request_body: Value, response_body: Value) -> EventRecord {
        let url = url::Url::parse("https://api.example.com/users").unwrap();
        let request = RequestRecord::new(
            "id-1",
            "POST",
            &url,
            json!({"authorization": "Bearer abc"}),
            request_body,
        );
        let response = ResponseRecord::new(200, "OK", json!({}), response_body);
        EventRecord::completed(request, response)
    }

    fn rendered(paths: &[ConcreteKeyPath]) -> Vec<String> {
        paths.iter().map(|p| p.external()).collect()
    }

    #[test]
    fn test_wildcard_fans_out_over_array() {
        let event = event(
            json!({}),
            json!({"data": {"users": [{"ssn": "1"}, {"ssn": "2"}, {"name": "x"}]}}),
        );
        let paths = expand_paths(&event, &[SensitiveKeyRule::redact("responseBody.data.users[*].ssn")]);
        assert_eq!(
            rendered(&paths),
            vec![
                "responseBody.data.users[0].ssn",
                "responseBody.data.users[1].ssn",
            ]
        );
    }

    #[test]
    fn test_empty_brackets_are_a_wildcard() {
        let event = event(json!([{"card": "4111"}, {"card": "4222"}]), json!({}));
        let paths = expand_paths(&event, &[SensitiveKeyRule::redact("requestBody[].card")]);
        assert_eq!(rendered(&paths), vec!["requestBody[0].card", "requestBody[1].card"]);
    }

    #[test]
    fn test_stale_rules_drop_silently() {
        let event = event(json!({"items": [1, 2]}), json!("plain text"));
        let rules = [
            SensitiveKeyRule::redact("requestBody.items[5]"),
            SensitiveKeyRule::redact("requestBody.items.name"),
            SensitiveKeyRule::redact("requestBody.missing[*].x"),
            SensitiveKeyRule::redact("responseBody.token"),
            SensitiveKeyRule::redact("not a path"),
        ];
        assert!(expand_paths(&event, &rules).is_empty());
    }

    #[test]
    fn test_action_is_preserved() {
        let event = event(json!({"a": 1, "b": 2}), json!({}));
        let paths = expand_paths(
            &event,
            &[
                SensitiveKeyRule::redact("requestBody.a"),
                SensitiveKeyRule::allow("requestBody.b"),
            ],
        );
        assert_eq!(paths[0].action, KeyAction::Redact);
        assert_eq!(paths[1].action, KeyAction::Allow);
    }

    #[test]
    fn test_leaf_paths_cover_all_sections() {
        let event = event(json!({"user": {"name": "a", "tags": []}}), json!("ok"));
        let leaves = rendered(&leaf_paths(&event, KeyAction::Redact));
        assert_eq!(
            leaves,
            vec![
                "requestHeaders.authorization",
                "requestBody.user.name",
                "requestBody.user.tags",
                "responseHeaders",
                "responseBody",
            ]
        );
    }

    proptest! {
        #[test]
        fn test_wildcard_yields_one_path_per_element(
            values in prop::collection::vec(any::<i64>(), 0..25)
        ) {
            let items: Vec<Value> = values.iter().map(|v| json!({"c": v, "other": true})).collect();
            let event = event(json!({"a": {"b": items}}), json!({}));

            let paths = expand_paths(&event, &[SensitiveKeyRule::redact("requestBody.a.b[*].c")]);

            prop_assert_eq!(paths.len(), values.len());
            for (index, path) in paths.iter().enumerate() {
                prop_assert_eq!(path.external(), format!("requestBody.a.b[{index}].c"));
                prop_assert!(path.external().ends_with(".c"));
            }
        }
    }
}
