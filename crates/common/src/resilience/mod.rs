//! Resilience patterns for fault tolerance
//!
//! - **Retry Logic**: classified retries with capped exponential backoff, used
//!   by the query cache for reads and the mutation contract for writes.
//! - **Clock**: time abstraction so staleness and GC timers can be driven
//!   deterministically in tests.

pub mod clock;
pub mod retry;

pub use clock::{Clock, MockClock, SystemClock};
pub use retry::{
    policies, BackoffStrategy, RetryConfig, RetryConfigBuilder, RetryConfigError, RetryDecision,
    RetryError, RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
