//! Integration tests for privacy module
//!
//! Exercises the redactor against payloads shaped like the ones the
//! transport logs: login bodies, refresh responses and header maps.

#![cfg(feature = "foundation")]

use cuidar_common::privacy::{Redactor, REDACTION_MASK};
use serde_json::json;

/// Validates that a login exchange never leaks credentials.
///
/// # Test Steps
/// 1. Redact a login request body and the matching response
/// 2. Verify password and both tokens are masked
/// 3. Verify the user profile fields survive unchanged
#[test]
fn test_login_exchange_is_masked() {
    let redactor = Redactor::default();
    let request = json!({"email": "ana@cuidar.example", "password": "hunter2"});
    let response = json!({
        "access_token": "A1",
        "refresh_token": "R1",
        "user": {"id": 7, "name": "Ana", "role": "admin"}
    });

    let request = redactor.redact(&request);
    let response = redactor.redact(&response);

    assert_eq!(request, json!({"email": "ana@cuidar.example", "password": REDACTION_MASK}));
    assert_eq!(response["access_token"], REDACTION_MASK);
    assert_eq!(response["refresh_token"], REDACTION_MASK);
    assert_eq!(response["user"], json!({"id": 7, "name": "Ana", "role": "admin"}));
}

/// Validates masking inside list payloads of arbitrary depth.
///
/// # Test Steps
/// 1. Build a paginated list whose items carry nested card data
/// 2. Redact it
/// 3. Verify every nested `cvv`/`pan` is masked and ordering is kept
#[test]
fn test_nested_list_items_are_masked() {
    let redactor = Redactor::default();
    let page = json!({
        "page": 1,
        "items": [
            {"id": 1, "billing": {"pan": "4111111111111111", "cvv": "123"}},
            {"id": 2, "billing": {"holder": "B. Silva"}}
        ]
    });

    let redacted = redactor.redact(&page);

    assert_eq!(redacted["page"], 1);
    assert_eq!(redacted["items"][0]["id"], 1);
    assert_eq!(redacted["items"][0]["billing"]["pan"], REDACTION_MASK);
    assert_eq!(redacted["items"][0]["billing"]["cvv"], REDACTION_MASK);
    assert_eq!(redacted["items"][1]["billing"]["holder"], "B. Silva");
    assert_eq!(redactor.redact(&redacted), redacted);
}

/// Validates header masking for the diagnostic log line.
#[test]
fn test_header_pairs_are_masked() {
    let redactor = Redactor::default();
    let headers =
        [("Authorization", "Bearer A1"), ("x-request-id", "3f0c"), ("X-Auth-Token", "k-123")];

    let redacted = redactor.redact_pairs(headers);

    assert_eq!(
        redacted,
        vec![
            ("Authorization".to_string(), REDACTION_MASK.to_string()),
            ("x-request-id".to_string(), "3f0c".to_string()),
            ("X-Auth-Token".to_string(), REDACTION_MASK.to_string()),
        ]
    );
}
