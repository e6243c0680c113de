//! Backend API access
//!
//! # Architecture
//!
//! - [`Transport`] sends requests with the current session and performs the
//!   single refresh-then-resend on a 401
//! - [`RefreshClient`] redeems refresh tokens for the refresh coordinator
//! - [`AuthApi`] signs in and out
//! - [`HttpDiagnostics`] emits redacted request/response lines outside
//!   production
//!
//! Read retries and caching live in [`crate::queries`]; the transport never
//! retries anything but a 401.

pub mod auth;
pub mod diagnostics;
pub mod errors;
pub mod request;
pub mod transport;

pub use auth::{AuthApi, LoginRequest, LoginResponse, RefreshClient};
pub use diagnostics::{HttpDiagnostics, HTTP_LOG_TARGET};
pub use errors::{ApiError, ApiErrorCategory};
pub use request::RequestDescriptor;
pub use transport::Transport;
