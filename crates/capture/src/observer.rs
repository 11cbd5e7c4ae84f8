//! Building records from intercepted traffic
//!
//! Interception itself lives outside this crate. Whatever hooks the host's
//! HTTP stack registers an [`ObservationSource`] so the pipeline can detach
//! it on shutdown, and reports traffic as [`RequestParts`] and
//! [`ResponseParts`].

use reqwest::StatusCode;
use serde_json::{Map, Value};
use wiretap_core::{body_from_bytes, Error, RequestRecord, ResponseRecord, Result, Tags};

/// A hook into the host's outbound HTTP machinery
pub trait ObservationSource: Send + Sync {
    fn name(&self) -> &str;

    /// Stop emitting events; called once when the pipeline stops
    fn teardown(&self);
}

/// Raw pieces of an outbound request
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub tags: Tags,
    pub trace_id: Option<String>,
}

impl RequestParts {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn into_record(self, id: &str) -> Result<RequestRecord> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| Error::caching(id, "request", format!("invalid URL '{}': {e}", self.url)))?;

        let mut record = RequestRecord::new(
            id,
            &self.method,
            &url,
            header_map(&self.headers),
            body_from_bytes(&self.body),
        )
        .with_tags(self.tags);
        if let Some(trace_id) = self.trace_id {
            record = record.with_trace_id(trace_id);
        }
        Ok(record)
    }
}

/// Raw pieces of a response
#[derive(Debug, Clone, Default)]
pub struct ResponseParts {
    pub status: u16,
    pub status_text: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ResponseParts {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Missing status text falls back to the canonical reason phrase
    pub fn into_record(self) -> ResponseRecord {
        let status_text = self.status_text.unwrap_or_else(|| {
            StatusCode::from_u16(self.status)
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or_default()
                .to_string()
        });
        ResponseRecord::new(
            self.status,
            status_text,
            header_map(&self.headers),
            body_from_bytes(&self.body),
        )
    }
}

/// Lowercased header names; repeated headers are joined with ", "
fn header_map(headers: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        match map.get_mut(&name) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            _ => {
                map.insert(name, Value::String(value.clone()));
            }
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_parts_into_record() {
        let record = RequestParts::new("post", "https://api.example.com/posts?draft=true")
            .header("Content-Type", "application/json")
            .header("Accept", "text/html")
            .header("accept", "application/json")
            .body(r#"{"title":"hello"}"#)
            .tag("team", "growth")
            .trace_id("trace-1")
            .into_record("req-1")
            .unwrap();

        assert_eq!(record.id, "req-1");
        assert_eq!(record.method, "POST");
        assert_eq!(record.path, "/posts");
        assert_eq!(record.search, "?draft=true");
        assert_eq!(
            record.headers,
            json!({"content-type": "application/json", "accept": "text/html, application/json"})
        );
        assert_eq!(record.body, json!({"title": "hello"}));
        assert_eq!(record.tags.get("team"), Some(&json!("growth")));
        assert_eq!(record.trace_id.as_deref(), Some("trace-1"));
    }

    #[test]
    fn test_bad_url_is_a_caching_error() {
        let err = RequestParts::new("GET", "not a url")
            .into_record("req-2")
            .unwrap_err();
        assert!(matches!(err, Error::Caching { stage: "request", .. }));
    }

    #[test]
    fn test_response_parts_into_record() {
        let record = ResponseParts::new(404).body("missing").into_record();
        assert_eq!(record.status_text, "Not Found");
        assert_eq!(record.body, json!("missing"));
        assert_eq!(record.headers, json!({}));

        let custom = ResponseParts::new(599).status_text("Custom").into_record();
        assert_eq!(custom.status_text, "Custom");
    }
}
