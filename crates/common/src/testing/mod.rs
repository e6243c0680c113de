//! Testing utilities and helpers
//!
//! - **[`mocks`]**: in-memory stand-ins for the token refresher, the
//!   platform keychain and a classifiable query error
//!
//! ```rust
//! # #[cfg(feature = "runtime")]
//! # {
//! use cuidar_common::auth::Session;
//! use cuidar_common::testing::MockTokenRefresher;
//!
//! let refresher = MockTokenRefresher::succeeding(Session::new("A2", "R2"));
//! assert_eq!(refresher.calls(), 0);
//! # }
//! ```

pub mod mocks;

#[cfg(feature = "platform")]
pub use mocks::MockKeychainProvider;
pub use mocks::{MockQueryError, MockTokenRefresher};
pub use crate::resilience::MockClock;
