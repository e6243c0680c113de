//! Retry classification for reads
//!
//! | Failure | Retried |
//! |---------|---------|
//! | 4xx except 408 | never |
//! | 408, 5xx, network, timeout | up to `max_retries` times |

use std::fmt;

use crate::error::CommonError;
use crate::resilience::{RetryDecision, RetryPolicy};

/// Error type the query cache can classify and report.
///
/// `From<CommonError>` covers payloads that fail to (de)serialize on their
/// way in or out of the cache.
pub trait QueryFailure:
    Clone + fmt::Debug + fmt::Display + From<CommonError> + Send + Sync + 'static
{
    /// HTTP status of the failed response, `None` for transport failures.
    fn status(&self) -> Option<u16>;

    /// Message shown to the user when the failure reaches the event sink.
    fn user_message(&self) -> String {
        self.to_string()
    }
}

/// Whether a failure is a client error that retrying cannot fix.
pub fn is_non_retryable_client_error(status: Option<u16>) -> bool {
    matches!(status, Some(code) if (400..500).contains(&code) && code != 408)
}

/// Read retry policy: no retries for client errors, bounded retries for the
/// rest.
#[derive(Debug, Clone, Copy)]
pub struct ReadRetryPolicy {
    max_retries: u32,
}

impl ReadRetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

impl<E: QueryFailure> RetryPolicy<E> for ReadRetryPolicy {
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
        if is_non_retryable_client_error(error.status()) || attempt >= self.max_retries {
            RetryDecision::Stop
        } else {
            RetryDecision::Retry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Status(Option<u16>);

    impl fmt::Display for Status {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "status {:?}", self.0)
        }
    }

    impl From<CommonError> for Status {
        fn from(_: CommonError) -> Self {
            Self(None)
        }
    }

    impl QueryFailure for Status {
        fn status(&self) -> Option<u16> {
            self.0
        }
    }

    fn decisions(status: Option<u16>) -> Vec<RetryDecision> {
        let policy = ReadRetryPolicy::new(2);
        (0..3).map(|attempt| policy.should_retry(&Status(status), attempt)).collect()
    }

    #[test]
    fn client_errors_stop_immediately() {
        for code in [400, 401, 403, 404, 409, 422, 499] {
            assert_eq!(decisions(Some(code))[0], RetryDecision::Stop, "status {code}");
        }
    }

    #[test]
    fn request_timeout_retries_twice() {
        assert_eq!(
            decisions(Some(408)),
            vec![RetryDecision::Retry, RetryDecision::Retry, RetryDecision::Stop]
        );
    }

    #[test]
    fn server_and_network_errors_retry_twice() {
        for status in [Some(500), Some(503), None] {
            assert_eq!(
                decisions(status),
                vec![RetryDecision::Retry, RetryDecision::Retry, RetryDecision::Stop]
            );
        }
    }
}
