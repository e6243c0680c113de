//! Shared building blocks for the Cuidar+ API client.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification, sensitive-field redaction
//! - `runtime`: retry executor, session store and refresh coordinator, query
//!   cache, client events, testing mocks
//! - `platform`: keychain-backed secret and session storage
//! - `test-utils`: everything the mocks need, for downstream dev-dependencies

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod privacy;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod auth;
#[cfg(feature = "runtime")]
pub mod cache;
#[cfg(feature = "runtime")]
pub mod events;
#[cfg(feature = "runtime")]
pub mod resilience;

// Platform tier
// -------------------------------------------------------------------
#[cfg(feature = "platform")]
pub mod security;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use auth::{
    AuthError, MemorySessionStore, RefreshCoordinator, Session, SessionRefresh, SessionStore,
    TokenRefresher,
};
#[cfg(feature = "platform")]
pub use auth::KeychainSessionStore;
#[cfg(feature = "runtime")]
pub use cache::{QueryCacheConfig, QueryClient, QueryFailure, QueryKey, QueryObserver, QueryState};
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use events::{ClientEvent, EventBus};
#[cfg(feature = "foundation")]
pub use privacy::Redactor;
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffStrategy, Clock, MockClock, RetryConfig, RetryDecision, RetryError, RetryExecutor,
    RetryPolicy, SystemClock,
};
#[cfg(feature = "platform")]
pub use security::{KeychainError, KeychainProvider, SecretStore};
