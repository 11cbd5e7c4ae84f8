//! Redaction engine and endpoint rule matching for wiretap
//!
//! - **`keypath`**: parsing of sensitive key paths and the mapping between
//!   the rule-author and internal path vocabularies.
//! - **`expand`**: resolution of (possibly wildcarded) paths against a
//!   concrete event.
//! - **`redact`**: the three redaction policies and in-place nulling with
//!   audit metadata.
//! - **`matcher`**: selection of the endpoint rule that governs a request.
//!
//! Nothing in this crate returns an error. Rules that do not parse or do not
//! match simply redact nothing.

pub mod expand;
pub mod keypath;
pub mod matcher;
pub mod redact;

pub use expand::{expand_paths, leaf_paths};
pub use keypath::{to_external, to_internal, ConcreteKeyPath, KeyPattern, Segment, Step};
pub use matcher::{decide, location_value, match_endpoint, EndpointDecision};
pub use redact::{redact, redact_in_place, redact_path, resolve_targets, value_length};
