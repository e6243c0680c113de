//! Query cache configuration and builder

use std::time::Duration;

use crate::resilience::{BackoffStrategy, RetryConfig};

/// Timers, retry budgets and refetch triggers for the query cache.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCacheConfig {
    /// Age after which cached data is refetched before being trusted.
    pub stale_time: Duration,

    /// How long an unobserved entry is kept before garbage collection.
    pub gc_time: Duration,

    /// Retries after the first failed read (4xx other than 408 never retry).
    pub max_read_retries: u32,

    /// First retry delay; doubles per retry.
    pub retry_base_delay: Duration,

    /// Ceiling for the retry delay.
    pub retry_max_delay: Duration,

    /// Retries after the first failed mutation.
    pub mutation_retries: u32,

    pub refetch_on_window_focus: bool,
    pub refetch_on_reconnect: bool,
    pub refetch_on_mount: bool,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            gc_time: Duration::from_secs(10 * 60),
            max_read_retries: 2,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            mutation_retries: 1,
            refetch_on_window_focus: false,
            refetch_on_reconnect: true,
            refetch_on_mount: true,
        }
    }
}

impl QueryCacheConfig {
    pub fn builder() -> QueryCacheConfigBuilder {
        QueryCacheConfigBuilder::default()
    }

    /// Retry budget for reads: `min(base * 2^attempt, max)` between attempts.
    pub fn read_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_read_retries.saturating_add(1),
            backoff: self.backoff(),
        }
    }

    /// Retry budget for mutations.
    pub fn mutation_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.mutation_retries.saturating_add(1),
            backoff: self.backoff(),
        }
    }

    fn backoff(&self) -> BackoffStrategy {
        BackoffStrategy::Exponential {
            initial_delay: self.retry_base_delay.min(self.retry_max_delay),
            base: 2.0,
            max_delay: self.retry_max_delay,
        }
    }
}

/// Builder for QueryCacheConfig with fluent API
#[derive(Debug, Default)]
pub struct QueryCacheConfigBuilder {
    config: QueryCacheConfig,
}

impl QueryCacheConfigBuilder {
    pub fn stale_time(mut self, duration: Duration) -> Self {
        self.config.stale_time = duration;
        self
    }

    pub fn gc_time(mut self, duration: Duration) -> Self {
        self.config.gc_time = duration;
        self
    }

    pub fn max_read_retries(mut self, retries: u32) -> Self {
        self.config.max_read_retries = retries;
        self
    }

    /// Set the first retry delay and the delay ceiling
    pub fn retry_delay(mut self, base: Duration, max: Duration) -> Self {
        self.config.retry_base_delay = base;
        self.config.retry_max_delay = max;
        self
    }

    pub fn mutation_retries(mut self, retries: u32) -> Self {
        self.config.mutation_retries = retries;
        self
    }

    pub fn refetch_on_window_focus(mut self, enabled: bool) -> Self {
        self.config.refetch_on_window_focus = enabled;
        self
    }

    pub fn refetch_on_reconnect(mut self, enabled: bool) -> Self {
        self.config.refetch_on_reconnect = enabled;
        self
    }

    pub fn refetch_on_mount(mut self, enabled: bool) -> Self {
        self.config.refetch_on_mount = enabled;
        self
    }

    pub fn build(self) -> QueryCacheConfig {
        self.config
    }
}
