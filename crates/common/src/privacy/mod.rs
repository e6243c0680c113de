//! Privacy Module
//!
//! Sensitive-field redaction applied to every payload before it reaches a log
//! line.

pub mod redaction;

// Re-export commonly used types
pub use redaction::{Redactor, DEFAULT_SENSITIVE_KEYS, REDACTION_MASK};
