//! Error type shared by configuration parsing and validation

use thiserror::Error;

/// Errors raised while building or validating client configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CuidarError {
    /// A config file, environment variable, or field value was rejected.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, CuidarError>;
