//! Mock implementations of common traits

#![allow(clippy::missing_errors_doc)]

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::auth::{AuthError, Session, TokenRefresher};
use crate::cache::QueryFailure;
use crate::error::CommonError;

#[cfg(feature = "platform")]
use std::collections::HashMap;

#[cfg(feature = "platform")]
use crate::security::{KeychainError, SecretStore};

/// Token refresher that answers from a script instead of the network.
///
/// Clones share the call log, so a clone can be handed to a coordinator and
/// inspected afterwards.
#[derive(Clone)]
pub struct MockTokenRefresher {
    outcomes: Arc<Mutex<VecDeque<Result<Session, AuthError>>>>,
    fallback: Arc<Result<Session, AuthError>>,
    delay: Option<Duration>,
    seen_tokens: Arc<Mutex<Vec<String>>>,
}

impl MockTokenRefresher {
    /// Every refresh returns `session`.
    pub fn succeeding(session: Session) -> Self {
        Self::with_fallback(Ok(session))
    }

    /// Every refresh fails with `error`.
    pub fn failing(error: AuthError) -> Self {
        Self::with_fallback(Err(error))
    }

    /// Refreshes return `outcomes` in order; once exhausted every further
    /// call fails with [`AuthError::NotAuthenticated`].
    pub fn sequence(outcomes: Vec<Result<Session, AuthError>>) -> Self {
        let mock = Self::with_fallback(Err(AuthError::NotAuthenticated));
        mock.outcomes.lock().extend(outcomes);
        mock
    }

    fn with_fallback(fallback: Result<Session, AuthError>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(fallback),
            delay: None,
            seen_tokens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Simulated network latency per call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.seen_tokens.lock().len()
    }

    /// Refresh tokens redeemed so far, in call order.
    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen_tokens.lock().clone()
    }
}

impl fmt::Debug for MockTokenRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTokenRefresher")
            .field("calls", &self.calls())
            .field("delay", &self.delay)
            .finish()
    }
}

#[async_trait]
impl TokenRefresher for MockTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.seen_tokens.lock().push(refresh_token.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.outcomes.lock().pop_front();
        scripted.unwrap_or_else(|| (*self.fallback).clone())
    }
}

/// Minimal classifiable error for exercising the query cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockQueryError {
    pub status: Option<u16>,
    pub message: String,
}

impl MockQueryError {
    /// Failure carrying an HTTP status.
    pub fn status(status: u16) -> Self {
        Self { status: Some(status), message: format!("HTTP {status}") }
    }

    /// Failure without a response, like a dropped connection.
    pub fn network(message: impl Into<String>) -> Self {
        Self { status: None, message: message.into() }
    }
}

impl fmt::Display for MockQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for MockQueryError {}

impl From<CommonError> for MockQueryError {
    fn from(err: CommonError) -> Self {
        Self::network(err.to_string())
    }
}

impl QueryFailure for MockQueryError {
    fn status(&self) -> Option<u16> {
        self.status
    }
}

/// In-memory keychain.
///
/// Clones share storage. [`MockKeychainProvider::fail_with`] makes every
/// subsequent operation fail, to simulate a locked keychain.
#[cfg(feature = "platform")]
#[derive(Debug, Clone, Default)]
pub struct MockKeychainProvider {
    storage: Arc<Mutex<HashMap<String, String>>>,
    failure: Arc<Mutex<Option<String>>>,
}

#[cfg(feature = "platform")]
impl MockKeychainProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.storage.lock().is_empty()
    }

    fn check(&self) -> Result<(), KeychainError> {
        match self.failure.lock().as_ref() {
            Some(message) => Err(KeychainError::AccessFailed(message.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(feature = "platform")]
impl SecretStore for MockKeychainProvider {
    fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError> {
        self.check()?;
        self.storage.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_secret(&self, key: &str) -> Result<Option<String>, KeychainError> {
        self.check()?;
        Ok(self.storage.lock().get(key).cloned())
    }

    fn delete_secret(&self, key: &str) -> Result<(), KeychainError> {
        self.check()?;
        self.storage.lock().remove(key);
        Ok(())
    }
}
