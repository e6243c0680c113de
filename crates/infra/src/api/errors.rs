//! API-specific error types
//!
//! Every failure the transport or a resource API can return, classified into
//! the categories the retry and sign-out logic act on.

use std::time::Duration;

use cuidar_common::auth::AuthError;
use cuidar_common::error::{CommonError, ErrorClassification, ErrorSeverity};
use cuidar_common::QueryFailure;
use reqwest::StatusCode;
use thiserror::Error;

/// Categories of API errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCategory {
    /// 401 - recoverable through a session refresh
    AuthenticationExpired,
    /// Refresh failed or the retried request got another 401 - sign in again
    AuthenticationFailed,
    /// 4xx other than 401/408 - surfaced, never retried
    Client,
    /// 408, 5xx, network and timeouts - retried by the read policy
    Transient,
    /// Local misconfiguration or an unreadable body
    Config,
}

/// API operation errors
///
/// `Clone` so a cached failure can be handed to every observer of a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Authentication required: {0}")]
    Unauthenticated(AuthError),

    #[error("Client error {status}: {message}")]
    Client { status: u16, message: String },

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Build the error for a non-success response.
    ///
    /// `body` is the raw response text; when it is a JSON object with a
    /// `message` field that field becomes the error message.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = backend_message(body).unwrap_or_else(|| {
            status.canonical_reason().map_or_else(|| status.to_string(), str::to_string)
        });
        let code = status.as_u16();

        if status == StatusCode::UNAUTHORIZED {
            Self::Unauthorized { message }
        } else if status.is_server_error() {
            Self::Server { status: code, message }
        } else {
            Self::Client { status: code, message }
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ApiErrorCategory {
        match self {
            Self::Unauthorized { .. } => ApiErrorCategory::AuthenticationExpired,
            Self::Unauthenticated(_) => ApiErrorCategory::AuthenticationFailed,
            Self::Client { status: 408, .. } => ApiErrorCategory::Transient,
            Self::Client { .. } => ApiErrorCategory::Client,
            Self::Server { .. } | Self::Network(_) | Self::Timeout(_) => {
                ApiErrorCategory::Transient
            }
            Self::Serialization(_) | Self::Config(_) => ApiErrorCategory::Config,
        }
    }

    /// HTTP status behind this error, if a response was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } | Self::Unauthenticated(_) => Some(401),
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::Network(_) | Self::Timeout(_) | Self::Serialization(_) | Self::Config(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

fn backend_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("message")?.as_str().map(str::to_string)
}

impl QueryFailure for ApiError {
    fn status(&self) -> Option<u16> {
        self.status_code()
    }

    fn user_message(&self) -> String {
        match self {
            Self::Unauthorized { message }
            | Self::Client { message, .. }
            | Self::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl ErrorClassification for ApiError {
    fn is_retryable(&self) -> bool {
        self.category() == ApiErrorCategory::Transient
    }

    fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ApiErrorCategory::AuthenticationExpired | ApiErrorCategory::Transient => {
                ErrorSeverity::Warning
            }
            ApiErrorCategory::Client => ErrorSeverity::Info,
            ApiErrorCategory::AuthenticationFailed | ApiErrorCategory::Config => {
                ErrorSeverity::Error
            }
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl From<CommonError> for ApiError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Serialization { .. } => Self::Serialization(err.to_string()),
            CommonError::Timeout { duration, .. } => Self::Timeout(duration),
            CommonError::Backend { is_retryable: true, .. } => Self::Network(err.to_string()),
            other => Self::Config(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Unauthenticated(err)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Serialization(err.to_string())
        } else if err.is_builder() {
            Self::Config(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED, "").is_unauthorized());
        assert_eq!(
            ApiError::from_status(StatusCode::NOT_FOUND, "").category(),
            ApiErrorCategory::Client
        );
        assert_eq!(
            ApiError::from_status(StatusCode::REQUEST_TIMEOUT, "").category(),
            ApiErrorCategory::Transient
        );
        assert_eq!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "").category(),
            ApiErrorCategory::Transient
        );
    }

    #[test]
    fn test_backend_message_is_preferred() {
        let err = ApiError::from_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"CPF já cadastrado"}"#,
        );
        assert_eq!(err, ApiError::Client { status: 422, message: "CPF já cadastrado".into() });
        assert_eq!(err.user_message(), "CPF já cadastrado");

        let err = ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, "upstream down");
        assert_eq!(err.user_message(), "Service Unavailable");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ApiError::Network("reset".into()).is_retryable());
        assert!(ApiError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(ApiError::Client { status: 408, message: String::new() }.is_retryable());
        assert!(!ApiError::Client { status: 404, message: String::new() }.is_retryable());
        assert!(!ApiError::Unauthenticated(AuthError::NotAuthenticated).is_retryable());
    }

    #[test]
    fn test_failed_refresh_is_not_retried_by_reads() {
        let err = ApiError::from(AuthError::Network("refused".into()));
        assert_eq!(err.category(), ApiErrorCategory::AuthenticationFailed);
        assert_eq!(QueryFailure::status(&err), Some(401));
    }

    #[test]
    fn test_common_error_conversion() {
        let err: ApiError = CommonError::serialization_format("json", "bad").into();
        assert!(matches!(err, ApiError::Serialization(_)));

        let err: ApiError = CommonError::internal("query has no fetcher").into();
        assert_eq!(err.category(), ApiErrorCategory::Config);
    }
}
