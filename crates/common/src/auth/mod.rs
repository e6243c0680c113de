//! Session management
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │ RefreshCoordinator │  single-flight refresh (SessionRefresh)
//! └─────────┬──────────┘
//!           │
//!           ├──► TokenRefresher   (network call, implemented in cuidar-infra)
//!           │
//!           └──► SessionStore     (memory or keychain-backed)
//! ```
//!
//! The transport depends only on [`SessionStore`] and [`SessionRefresh`], so
//! either side can be swapped for a mock in tests.

pub mod coordinator;
pub mod error;
pub mod session_store;
pub mod types;

pub use coordinator::{
    RefreshCoordinator, RefreshStats, RefreshStatsSnapshot, SessionRefresh, TokenRefresher,
    DEFAULT_REFRESH_TIMEOUT,
};
pub use error::AuthError;
#[cfg(feature = "platform")]
pub use session_store::KeychainSessionStore;
pub use session_store::{MemorySessionStore, SessionStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
pub use types::Session;
