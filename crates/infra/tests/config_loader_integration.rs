//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files.

use std::io::Write;

use cuidar_domain::Environment;
use cuidar_infra::config;
use tempfile::NamedTempFile;

fn config_file(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("cuidar")
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(contents.as_bytes()).expect("Failed to write to temp file");
    file
}

#[test]
fn test_load_config_from_toml_file() {
    let file = config_file(
        ".toml",
        r#"
environment = "production"

[api]
base_url = "https://api.cuidar.example/api/v1"
timeout_ms = 5000

[session]
service_name = "cuidar-plus-staging"
refresh_timeout_ms = 8000

[cache]
stale_time_ms = 60000
refetch_on_reconnect = false
"#,
    );

    let config = config::load_from_file(Some(file.path().to_path_buf())).unwrap();

    assert_eq!(config.environment, Environment::Production);
    assert_eq!(config.api.base_url, "https://api.cuidar.example/api/v1");
    assert_eq!(config.api.timeout_ms, 5000);
    assert_eq!(config.session.service_name, "cuidar-plus-staging");
    assert_eq!(config.session.refresh_timeout_ms, 8000);
    assert_eq!(config.cache.stale_time_ms, 60_000);
    assert!(!config.cache.refetch_on_reconnect);

    // Unset fields keep their defaults
    assert_eq!(config.cache.gc_time_ms, 600_000);
    assert_eq!(config.cache.max_read_retries, 2);
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_config_from_json_file() {
    let file = config_file(
        ".json",
        r#"{
            "environment": "test",
            "api": { "base_url": "http://127.0.0.1:9000/api/v1" },
            "cache": { "mutation_retries": 3 }
        }"#,
    );

    let config = config::load_from_file(Some(file.path().to_path_buf())).unwrap();

    assert_eq!(config.environment, Environment::Test);
    assert_eq!(config.api.base_url, "http://127.0.0.1:9000/api/v1");
    assert_eq!(config.api.timeout_ms, 10_000);
    assert_eq!(config.cache.mutation_retries, 3);
    assert_eq!(config.session.refresh_timeout_ms, 15_000);
}

#[test]
fn test_missing_file_is_an_error() {
    let result = config::load_from_file(Some("/nonexistent/cuidar.toml".into()));

    let err = result.unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}

#[test]
fn test_malformed_files_are_rejected() {
    let toml = config_file(".toml", "[api\nbase_url = ");
    let err = config::load_from_file(Some(toml.path().to_path_buf())).unwrap_err();
    assert!(err.to_string().contains("Invalid TOML format"));

    let json = config_file(".json", r#"{ "api": { "timeout_ms": "fast" } }"#);
    let err = config::load_from_file(Some(json.path().to_path_buf())).unwrap_err();
    assert!(err.to_string().contains("Invalid JSON format"));
}

#[test]
fn test_unsupported_extension_is_rejected() {
    let file = config_file(".yaml", "environment: test\n");

    let err = config::load_from_file(Some(file.path().to_path_buf())).unwrap_err();

    assert!(err.to_string().contains("Unsupported config format: yaml"));
}

#[test]
fn test_loaded_config_builds_a_client() {
    let file = config_file(
        ".toml",
        r#"
[api]
base_url = "http://localhost:8080/api/v1"

[cache]
retry_base_delay_ms = 500
retry_max_delay_ms = 4000
"#,
    );
    let config = config::load_from_file(Some(file.path().to_path_buf())).unwrap();

    let cache = cuidar_infra::client::query_cache_config(&config);

    assert_eq!(cache.stale_time, std::time::Duration::from_secs(300));
    assert_eq!(cache.retry_base_delay, std::time::Duration::from_millis(500));
    assert_eq!(cache.retry_max_delay, std::time::Duration::from_millis(4000));
}
