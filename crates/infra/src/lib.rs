//! # Cuidar Infrastructure
//!
//! Network-facing implementations for the Cuidar+ API-access layer.
//!
//! This crate contains:
//! - The reqwest HTTP client and the authenticated [`Transport`]
//! - The backend refresh call and the sign-in API
//! - Entity query keys and cached resource APIs
//! - Configuration loading and tracing setup
//! - The [`ApiClient`] facade that wires them together
//!
//! ## Architecture
//! - Builds on the session, cache and event primitives in `cuidar-common`
//! - Depends on `cuidar-domain` for configuration and endpoint constants
//! - Contains all "impure" code (network I/O, environment, files)

pub mod api;
pub mod client;
pub mod config;
pub mod http;
pub mod observability;
pub mod queries;

// Re-export commonly used items
pub use api::{ApiError, ApiErrorCategory, AuthApi, RequestDescriptor, Transport};
pub use client::{ApiClient, ApiClientBuilder};
pub use http::HttpClient;
pub use queries::{DashboardApi, ResourceApi};
