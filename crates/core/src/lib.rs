//! Core domain types, errors, and capture context for `wiretap`.
//!
//! ## Key Components
//!
//! - **`errors`**: the `Error` enum and `Result` alias shared by every crate
//!   in the workspace.
//! - **`types`**: request, response and event records, plus the redaction
//!   audit metadata attached to delivered events.
//! - **`context`**: task-local capture scopes carrying tags, trace ids and
//!   the owning pipeline instance.
//! - **`constants`**: default endpoints, intervals and environment variable
//!   names.

pub mod constants;
pub mod context;
pub mod errors;
pub mod types;

pub use self::{
    constants::*,
    context::CaptureScope,
    errors::{Error, Result},
    types::*,
};
