//! Configuration management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_API_TIMEOUT_MS, DEFAULT_GC_TIME_MS, DEFAULT_KEYCHAIN_SERVICE,
    DEFAULT_MAX_READ_RETRIES, DEFAULT_MUTATION_RETRIES, DEFAULT_REFRESH_TIMEOUT_MS,
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS, DEFAULT_STALE_TIME_MS,
    DEFAULT_USER_AGENT,
};
use crate::{CuidarError, Result};

/// Deployment environment the client runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// Parse the environment name used by `CUIDAR_ENV`.
    ///
    /// Accepts the short forms `dev` and `prod` as well.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(CuidarError::Config(format!("Unknown environment: {other}"))),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: Environment,
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub cache: CacheSettings,
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Redacted request/response logging is only emitted outside production.
    pub fn diagnostics_enabled(&self) -> bool {
        !self.is_production()
    }

    /// Refetch-on-focus only runs in deployed builds to avoid refetch storms
    /// while developing locally.
    pub fn refetch_on_window_focus(&self) -> bool {
        self.is_production()
    }

    /// Validate values that would otherwise fail late at request time.
    ///
    /// # Errors
    /// Returns `CuidarError::Config` for a relative or malformed base URL and
    /// for zero timeouts.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(CuidarError::Config("api.base_url must not be empty".to_string()));
        }
        let parsed = url::Url::parse(&self.api.base_url).map_err(|e| {
            CuidarError::Config(format!("api.base_url is not an absolute URL: {e}"))
        })?;
        if parsed.cannot_be_a_base() {
            return Err(CuidarError::Config(format!(
                "api.base_url cannot be used as a base: {}",
                self.api.base_url
            )));
        }
        if self.api.timeout_ms == 0 {
            return Err(CuidarError::Config("api.timeout_ms must be positive".to_string()));
        }
        if self.session.refresh_timeout_ms == 0 {
            return Err(CuidarError::Config(
                "session.refresh_timeout_ms must be positive".to_string(),
            ));
        }
        if self.cache.retry_base_delay_ms > self.cache.retry_max_delay_ms {
            return Err(CuidarError::Config(
                "cache.retry_base_delay_ms exceeds cache.retry_max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Backend API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_ms: DEFAULT_API_TIMEOUT_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Session storage and refresh configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Keychain service name the two token slots live under.
    pub service_name: String,
    /// Upper bound on a single refresh call; every queued waiter fails with a
    /// timeout once it elapses.
    pub refresh_timeout_ms: u64,
}

impl SessionConfig {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_KEYCHAIN_SERVICE.to_string(),
            refresh_timeout_ms: DEFAULT_REFRESH_TIMEOUT_MS,
        }
    }
}

/// Query cache timers and retry budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub stale_time_ms: u64,
    pub gc_time_ms: u64,
    pub max_read_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub mutation_retries: u32,
    pub refetch_on_reconnect: bool,
    pub refetch_on_mount: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_time_ms: DEFAULT_STALE_TIME_MS,
            gc_time_ms: DEFAULT_GC_TIME_MS,
            max_read_retries: DEFAULT_MAX_READ_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            mutation_retries: DEFAULT_MUTATION_RETRIES,
            refetch_on_reconnect: true,
            refetch_on_mount: true,
        }
    }
}
