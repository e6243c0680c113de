//! # Cuidar Domain
//!
//! Domain types shared by the Cuidar+ API-access layer.
//!
//! This crate contains:
//! - Domain error types and Result definitions
//! - Configuration structures (API, session, query cache)
//! - Backend endpoint constants
//!
//! ## Architecture
//! - No dependencies on other Cuidar crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
