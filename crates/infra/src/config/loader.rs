//! Configuration loader
//!
//! Loads client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. A `.env` file in the working directory (or a parent) is applied to
//!    the process environment, without overriding variables already set
//! 2. Environment variables are read; `CUIDAR_API_BASE_URL` is required
//! 3. If it is missing, falls back to loading from file
//! 4. The result is validated before it is returned
//!
//! ## Environment Variables
//! - `CUIDAR_API_BASE_URL`: Absolute API base URL (required)
//! - `CUIDAR_ENV`: `development`, `test` or `production`
//! - `CUIDAR_API_TIMEOUT_MS`: Per-request timeout
//! - `CUIDAR_SESSION_SERVICE`: Keychain service for the session slots
//! - `CUIDAR_REFRESH_TIMEOUT_MS`: Bound on one refresh call
//! - `CUIDAR_CACHE_STALE_MS`: Query stale time
//! - `CUIDAR_CACHE_GC_MS`: Query garbage-collection time
//! - `CUIDAR_CACHE_REFETCH_ON_RECONNECT`: `true`/`false`
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./cuidar.toml` or `./cuidar.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names in the parent and grandparent directories
//! 4. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use cuidar_domain::{Config, CuidarError, Environment, Result};

const CONFIG_FILE_NAMES: [&str; 4] = ["cuidar.toml", "cuidar.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `CuidarError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - The loaded configuration fails [`Config::validate`]
pub fn load() -> Result<Config> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Applied .env file");
    }

    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)?
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// `CUIDAR_API_BASE_URL` must be present; every other variable falls back
/// to its default.
///
/// # Errors
/// Returns `CuidarError::Config` if the base URL is missing or a variable
/// has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();
    config.api.base_url = env_var("CUIDAR_API_BASE_URL")?;

    if let Some(environment) = optional_env_var("CUIDAR_ENV") {
        config.environment = Environment::parse(&environment)?;
    }
    if let Some(timeout) = env_parse::<u64>("CUIDAR_API_TIMEOUT_MS")? {
        config.api.timeout_ms = timeout;
    }
    if let Some(service) = optional_env_var("CUIDAR_SESSION_SERVICE") {
        config.session.service_name = service;
    }
    if let Some(timeout) = env_parse::<u64>("CUIDAR_REFRESH_TIMEOUT_MS")? {
        config.session.refresh_timeout_ms = timeout;
    }
    if let Some(stale) = env_parse::<u64>("CUIDAR_CACHE_STALE_MS")? {
        config.cache.stale_time_ms = stale;
    }
    if let Some(gc) = env_parse::<u64>("CUIDAR_CACHE_GC_MS")? {
        config.cache.gc_time_ms = gc;
    }
    config.cache.refetch_on_reconnect =
        env_bool("CUIDAR_CACHE_REFETCH_ON_RECONNECT", config.cache.refetch_on_reconnect);

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
/// Missing sections and fields take their defaults.
///
/// # Errors
/// Returns `CuidarError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CuidarError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CuidarError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CuidarError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
pub fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CuidarError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CuidarError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(CuidarError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        for dir in [cwd.clone(), cwd.join(".."), cwd.join("../..")] {
            candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| dir.join(name)));
        }
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| exe_dir.join(name)));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    optional_env_var(key).ok_or_else(|| {
        CuidarError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Non-empty environment variable, if set
fn optional_env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse an optional environment variable
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env_var(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| CuidarError::Config(format!("Invalid {key}: {e}")))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
