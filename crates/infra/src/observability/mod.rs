//! Observability
//!
//! Structured logging through `tracing`. Request/response diagnostics are
//! emitted by [`crate::api::HttpDiagnostics`]; this module installs the
//! subscriber that receives them.

pub mod logging;

pub use logging::{default_filter, init_tracing};
