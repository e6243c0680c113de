//! Client-side query cache
//!
//! Entries are addressed by hierarchical [`QueryKey`]s and carry staleness
//! and garbage-collection timers. Reads are retried according to
//! [`ReadRetryPolicy`]; writes go through [`QueryClient::mutate`], which
//! invalidates the key prefixes the caller declares.
//!
//! # Examples
//!
//! ```ignore
//! use cuidar_common::cache::{QueryCacheConfig, QueryClient, QueryKey};
//! use cuidar_common::events::EventBus;
//! use cuidar_common::testing::MockQueryError;
//!
//! # async fn demo() -> Result<(), MockQueryError> {
//! let cache: QueryClient<MockQueryError> =
//!     QueryClient::new(QueryCacheConfig::default(), EventBus::new());
//! let key = QueryKey::root("patients").child("list");
//!
//! let names: Vec<String> = cache
//!     .get_or_fetch(&key, || async { Ok(vec!["Ana".to_string()]) })
//!     .await?;
//! assert_eq!(names.len(), 1);
//!
//! // Creating a patient invalidates every patients.* entry.
//! cache.mutate(&[QueryKey::root("patients")], || async { Ok(()) }).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod key;
pub mod policy;
pub mod stats;

pub use client::{QueryClient, QueryObserver, QueryState};
pub use config::{QueryCacheConfig, QueryCacheConfigBuilder};
pub use key::QueryKey;
pub use policy::{is_non_retryable_client_error, QueryFailure, ReadRetryPolicy};
pub use stats::CacheStats;
