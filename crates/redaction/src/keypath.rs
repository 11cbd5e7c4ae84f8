//! Sensitive key path grammar
//!
//! A key path names a value inside one section of a captured exchange:
//!
//! ```text
//! responseBody.items[*].token
//! requestHeaders.authorization
//! requestBody[0]["dotted.key"]
//! ```
//!
//! Rule authors write the external prefixes (`requestHeaders`, `requestBody`,
//! `responseHeaders`, `responseBody`). The engine addresses event fields by
//! their internal layout (`request.headers` and so on). Parsing normalises
//! through [`to_internal`], so both spellings give the same [`KeyPattern`];
//! metadata is rendered back through [`to_external`].

use std::fmt;
use wiretap_config::KeyAction;
use wiretap_core::Section;

/// One step of a path pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
    /// `[*]` or `[]`: every element of the array at this point
    Wildcard,
}

/// One step of a concrete path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    Key(String),
    Index(usize),
}

/// A parsed, possibly wildcarded key path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    pub section: Section,
    pub segments: Vec<Segment>,
}

impl KeyPattern {
    /// Parse either vocabulary; `None` for unknown prefixes or bad syntax
    pub fn parse(path: &str) -> Option<Self> {
        let path = to_internal(path.trim());
        let (section, rest) = split_section(&path)?;
        let segments = parse_segments(rest)?;
        Some(Self { section, segments })
    }
}

/// A path resolved against a concrete payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcreteKeyPath {
    pub section: Section,
    pub steps: Vec<Step>,
    pub action: KeyAction,
}

impl ConcreteKeyPath {
    pub fn new(section: Section, steps: Vec<Step>, action: KeyAction) -> Self {
        Self {
            section,
            steps,
            action,
        }
    }

    /// Whether `other` is this path or lies underneath it
    pub fn covers(&self, other: &ConcreteKeyPath) -> bool {
        self.section == other.section && other.steps.starts_with(&self.steps)
    }

    /// Rendered with the rule-author prefixes, as reported in metadata
    pub fn external(&self) -> String {
        to_external(&self.internal())
    }

    /// Rendered with the event field layout
    pub fn internal(&self) -> String {
        render(self.section.internal_prefix(), &self.steps)
    }
}

impl fmt::Display for ConcreteKeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.external())
    }
}

fn render(prefix: &str, steps: &[Step]) -> String {
    let mut out = String::from(prefix);
    for step in steps {
        match step {
            Step::Key(key) if needs_quoting(key) => {
                out.push_str("[\"");
                out.push_str(key);
                out.push_str("\"]");
            }
            Step::Key(key) => {
                out.push('.');
                out.push_str(key);
            }
            Step::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}

fn needs_quoting(key: &str) -> bool {
    key.is_empty() || key.contains(['.', '[', ']', '"'])
}

fn prefix_matches(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('['),
        None => false,
    }
}

fn split_section(path: &str) -> Option<(Section, &str)> {
    Section::ALL.into_iter().find_map(|section| {
        let prefix = section.internal_prefix();
        prefix_matches(path, prefix).then(|| (section, &path[prefix.len()..]))
    })
}

/// Map an external prefix to the internal one; other paths pass through
pub fn to_internal(path: &str) -> String {
    for section in Section::ALL {
        let external = section.external_prefix();
        if prefix_matches(path, external) {
            return format!("{}{}", section.internal_prefix(), &path[external.len()..]);
        }
    }
    path.to_string()
}

/// Map an internal prefix back to the external one; other paths pass through
pub fn to_external(path: &str) -> String {
    for section in Section::ALL {
        let internal = section.internal_prefix();
        if prefix_matches(path, internal) {
            return format!("{}{}", section.external_prefix(), &path[internal.len()..]);
        }
    }
    path.to_string()
}

fn parse_segments(rest: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut chars = rest.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                let mut key = String::new();
                while let Some(&next) = chars.peek() {
                    if next == '.' || next == '[' {
                        break;
                    }
                    key.push(next);
                    chars.next();
                }
                if key.is_empty() {
                    return None;
                }
                segments.push(Segment::Key(key));
            }
            '[' => {
                let mut inner = String::new();
                let mut closed = false;
                let quote = match chars.peek() {
                    Some(&q @ ('"' | '\'')) => {
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                while let Some(next) = chars.next() {
                    match quote {
                        Some(q) if next == q => {
                            closed = chars.next() == Some(']');
                            break;
                        }
                        None if next == ']' => {
                            closed = true;
                            break;
                        }
                        _ => inner.push(next),
                    }
                }
                if !closed {
                    return None;
                }
                let segment = match (quote, inner.trim()) {
                    (Some(_), _) => Segment::Key(inner),
                    (None, "" | "*") => Segment::Wildcard,
                    (None, digits) => Segment::Index(digits.parse().ok()?),
                };
                segments.push(segment);
            }
            _ => return None,
        }
    }

    Some(segments)
}
