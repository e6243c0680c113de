//! Authentication and refresh errors

use std::time::Duration;

use thiserror::Error;

use crate::error::{CommonError, ErrorClassification, ErrorSeverity};

/// Failure of a session operation.
///
/// `Clone` so that the outcome of one refresh can be handed to every waiter
/// that joined it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No session is stored, so there is nothing to refresh.
    #[error("No active session")]
    NotAuthenticated,

    /// The backend answered the refresh call with a non-success status.
    #[error("Refresh rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The refresh call could not reach the backend.
    #[error("Refresh network error: {0}")]
    Network(String),

    /// The refresh call did not finish within the configured bound.
    #[error("Refresh timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with a body that is not a session.
    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    /// Reading or writing the session store failed.
    #[error("Session storage error: {0}")]
    Storage(String),
}

impl From<CommonError> for AuthError {
    fn from(err: CommonError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl ErrorClassification for AuthError {
    fn is_retryable(&self) -> bool {
        // Refresh failures end the session.
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotAuthenticated | Self::Rejected { .. } => ErrorSeverity::Warning,
            Self::Network(_) | Self::Timeout(_) | Self::InvalidResponse(_) => ErrorSeverity::Error,
            Self::Storage(_) => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
