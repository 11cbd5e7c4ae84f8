//! Captured HTTP exchange records
//!
//! A [`RequestRecord`] is created when the collaborator observes an outbound
//! request, a [`ResponseRecord`] when it observes the matching response. The
//! cache merges the two into an [`EventRecord`], which is what gets redacted
//! and delivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Caller-supplied tags attached to captured events
pub type Tags = BTreeMap<String, Value>;

/// One observed outbound request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub id: String,
    pub method: String,
    pub url: String,
    pub host: String,
    pub path: String,
    pub search: String,
    /// Header map as a JSON object
    pub headers: Value,
    /// Parsed JSON when the payload was JSON, otherwise the raw text
    pub body: Value,
    pub requested_at: DateTime<Utc>,
    #[serde(skip)]
    pub tags: Tags,
    #[serde(skip)]
    pub trace_id: Option<String>,
}

impl RequestRecord {
    /// Build a record from an already-parsed URL
    pub fn new(
        id: impl Into<String>,
        method: impl AsRef<str>,
        url: &url::Url,
        headers: Value,
        body: Value,
    ) -> Self {
        Self {
            id: id.into(),
            method: method.as_ref().to_ascii_uppercase(),
            url: url.to_string(),
            host: url.host_str().unwrap_or_default().to_string(),
            path: url.path().to_string(),
            search: url.query().map(|q| format!("?{q}")).unwrap_or_default(),
            headers,
            body,
            requested_at: Utc::now(),
            tags: Tags::new(),
            trace_id: None,
        }
    }

    /// Attach tags that take precedence over any scope tags stamped later
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Attach an explicit trace id
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// One observed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub status: u16,
    pub status_text: String,
    pub headers: Value,
    pub body: Value,
    pub responded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl ResponseRecord {
    pub fn new(status: u16, status_text: impl Into<String>, headers: Value, body: Value) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers,
            body,
            responded_at: Utc::now(),
            duration_ms: None,
        }
    }
}

/// Type of a value that was redacted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Null,
    Array,
    Object,
    String,
    Integer,
    Float,
    Boolean,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
            Value::String(_) => ValueKind::String,
            Value::Number(n) if n.is_f64() => ValueKind::Float,
            Value::Number(_) => ValueKind::Integer,
            Value::Bool(_) => ValueKind::Boolean,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// Audit entry for one redacted value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionMeta {
    pub key_path: String,
    #[serde(rename = "type")]
    pub kind: ValueKind,
    pub length: usize,
}

/// Metadata delivered alongside each event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default)]
    pub sensitive_keys: Vec<RedactionMeta>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// A request optionally paired with its response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub request: RequestRecord,
    #[serde(default)]
    pub response: Option<ResponseRecord>,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl EventRecord {
    /// Event for a request that never received a response
    pub fn request_only(request: RequestRecord) -> Self {
        let metadata = EventMetadata {
            sensitive_keys: Vec::new(),
            tags: request.tags.clone(),
            trace: request.trace_id.clone(),
        };
        Self {
            request,
            response: None,
            metadata,
        }
    }

    /// Merge a response into its request
    pub fn completed(request: RequestRecord, mut response: ResponseRecord) -> Self {
        let elapsed = response.responded_at - request.requested_at;
        response.duration_ms = Some(elapsed.num_milliseconds().max(0));
        let mut event = Self::request_only(request);
        event.response = Some(response);
        event
    }

    pub fn id(&self) -> &str {
        &self.request.id
    }

    /// Borrow one redactable section of the exchange
    pub fn section(&self, section: Section) -> Option<&Value> {
        match section {
            Section::RequestHeaders => Some(&self.request.headers),
            Section::RequestBody => Some(&self.request.body),
            Section::ResponseHeaders => self.response.as_ref().map(|r| &r.headers),
            Section::ResponseBody => self.response.as_ref().map(|r| &r.body),
        }
    }

    /// Mutably borrow one redactable section of the exchange
    pub fn section_mut(&mut self, section: Section) -> Option<&mut Value> {
        match section {
            Section::RequestHeaders => Some(&mut self.request.headers),
            Section::RequestBody => Some(&mut self.request.body),
            Section::ResponseHeaders => self.response.as_mut().map(|r| &mut r.headers),
            Section::ResponseBody => self.response.as_mut().map(|r| &mut r.body),
        }
    }
}

/// The four parts of an exchange that key paths can address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    RequestHeaders,
    RequestBody,
    ResponseHeaders,
    ResponseBody,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::RequestHeaders,
        Section::RequestBody,
        Section::ResponseHeaders,
        Section::ResponseBody,
    ];

    /// Prefix used by rule authors and in delivered metadata
    pub fn external_prefix(self) -> &'static str {
        use crate::constants::*;
        match self {
            Section::RequestHeaders => REQUEST_HEADERS_PREFIX,
            Section::RequestBody => REQUEST_BODY_PREFIX,
            Section::ResponseHeaders => RESPONSE_HEADERS_PREFIX,
            Section::ResponseBody => RESPONSE_BODY_PREFIX,
        }
    }

    /// Prefix matching the field layout of [`EventRecord`]
    pub fn internal_prefix(self) -> &'static str {
        match self {
            Section::RequestHeaders => "request.headers",
            Section::RequestBody => "request.body",
            Section::ResponseHeaders => "response.headers",
            Section::ResponseBody => "response.body",
        }
    }
}

/// Interpret a captured payload: JSON when it parses, otherwise UTF-8 text
pub fn body_from_bytes(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::String(String::new());
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
