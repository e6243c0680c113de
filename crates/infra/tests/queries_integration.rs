//! Integration tests for cached entity reads and mutations

mod support;

use cuidar_common::auth::Session;
use cuidar_common::events::ClientEvent;
use cuidar_infra::queries::keys;
use cuidar_infra::ApiError;
use serde_json::{json, Value};
use support::{session_response, TestApi};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

async fn hits(api: &TestApi, verb: &str, route: &str) -> usize {
    api.server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == route)
        .count()
}

#[tokio::test]
async fn test_fresh_read_is_served_from_cache() {
    let api = TestApi::signed_in().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/patients"))
        .and(query_param("status", "active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "p-1"}])))
        .expect(1)
        .mount(&api.server)
        .await;

    let patients = api.client.patients();
    let filters = json!({"status": "active"});
    let first: Value = patients.list(&filters).await.unwrap();
    let second: Value = patients.list(&filters).await.unwrap();

    assert_eq!(first, second);
    assert!(api.client.queries().contains(&keys::PATIENTS.list(&filters)));
}

/// Validates that client errors are not retried and are reported once.
#[tokio::test]
async fn test_not_found_is_not_retried() {
    let api = TestApi::signed_in().await;
    let mut events = api.client.events().subscribe();

    Mock::given(method("GET"))
        .and(path("/api/v1/patients/missing"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"message": "Paciente não encontrado"})),
        )
        .expect(1)
        .mount(&api.server)
        .await;

    let err = api.client.patients().detail::<Value>("missing").await.unwrap_err();

    assert_eq!(err, ApiError::Client { status: 404, message: "Paciente não encontrado".into() });
    match events.recv().await.unwrap() {
        ClientEvent::QueryFailed { message, .. } => assert_eq!(message, "Paciente não encontrado"),
        other => panic!("unexpected event {other:?}"),
    }
}

/// Validates that server errors and request timeouts use the full read
/// retry budget (1 attempt + 2 retries).
#[tokio::test]
async fn test_transient_failures_are_retried() {
    let api = TestApi::signed_in().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/dashboard/stats"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&api.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/reports"))
        .respond_with(ResponseTemplate::new(408))
        .expect(3)
        .mount(&api.server)
        .await;

    let err = api.client.dashboard().stats::<Value>().await.unwrap_err();
    assert_eq!(err.status_code(), Some(500));

    let err = api.client.reports().list::<Value>(&Value::Null).await.unwrap_err();
    assert_eq!(err.status_code(), Some(408));
}

#[tokio::test]
async fn test_transient_failure_recovers_within_budget() {
    let api = TestApi::signed_in().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/dashboard/recent-activity"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&api.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dashboard/recent-activity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"kind": "login"}])))
        .mount(&api.server)
        .await;

    let activity: Value = api.client.dashboard().recent_activity().await.unwrap();

    assert_eq!(activity, json!([{"kind": "login"}]));
    assert_eq!(hits(&api, "GET", "/api/v1/dashboard/recent-activity").await, 2);
}

/// Validates that a successful create invalidates every cached query of
/// the entity.
///
/// # Test Steps
/// 1. Cache a patient list and a patient detail
/// 2. Create a patient
/// 3. Read both again; verify each was refetched exactly once more
#[tokio::test]
async fn test_create_invalidates_entity_queries() {
    let api = TestApi::signed_in().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&api.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/patients/p-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p-1"})))
        .mount(&api.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/patients"))
        .and(body_json(json!({"name": "Ana"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p-2", "name": "Ana"})))
        .expect(1)
        .mount(&api.server)
        .await;

    let patients = api.client.patients();
    let _: Value = patients.list(&Value::Null).await.unwrap();
    let _: Value = patients.detail("p-1").await.unwrap();

    let created: Value = patients.create(&json!({"name": "Ana"})).await.unwrap();
    assert_eq!(created["id"], "p-2");

    let _: Value = patients.list(&Value::Null).await.unwrap();
    let _: Value = patients.detail("p-1").await.unwrap();

    assert_eq!(hits(&api, "GET", "/api/v1/patients").await, 2);
    assert_eq!(hits(&api, "GET", "/api/v1/patients/p-1").await, 2);
}

/// Validates the mutation failure contract: one retry, one event with the
/// backend message, no invalidation.
#[tokio::test]
async fn test_failed_mutation_retries_once_and_reports() {
    let api = TestApi::signed_in().await;
    let mut events = api.client.events().subscribe();

    Mock::given(method("GET"))
        .and(path("/api/v1/inventory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"sku": "A-1"}])))
        .expect(1)
        .mount(&api.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/inventory"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"message": "Estoque insuficiente"})),
        )
        .expect(2)
        .mount(&api.server)
        .await;

    let inventory = api.client.inventory();
    let _: Value = inventory.list(&Value::Null).await.unwrap();

    let err = inventory.create::<_, Value>(&json!({"sku": "A-1", "qty": -5})).await.unwrap_err();
    assert_eq!(err.status_code(), Some(422));
    assert_eq!(
        events.recv().await.unwrap(),
        ClientEvent::MutationFailed { message: "Estoque insuficiente".into() }
    );

    let _: Value = inventory.list(&Value::Null).await.unwrap();
}

#[tokio::test]
async fn test_update_and_delete_invalidate() {
    let api = TestApi::signed_in().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/users/u-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u-1"})))
        .mount(&api.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/users/u-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "u-1", "role": "admin"})),
        )
        .expect(1)
        .mount(&api.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/users/u-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&api.server)
        .await;

    let users = api.client.users();
    let _: Value = users.detail("u-1").await.unwrap();

    let updated: Value = users.update("u-1", &json!({"role": "admin"})).await.unwrap();
    assert_eq!(updated["role"], "admin");
    let _: Value = users.detail("u-1").await.unwrap();

    users.delete("u-1").await.unwrap();
    let _: Value = users.detail("u-1").await.unwrap();

    assert_eq!(hits(&api, "GET", "/api/v1/users/u-1").await, 3);
}

/// Validates that a cached read survives an expired access token.
#[tokio::test]
async fn test_cached_read_recovers_from_expired_token() {
    let api = TestApi::signed_in().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/reports/r-9"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&api.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(session_response("A2", "R2"))
        .expect(1)
        .mount(&api.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/reports/r-9"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r-9"})))
        .expect(1)
        .mount(&api.server)
        .await;

    let report: Value = api.client.reports().detail("r-9").await.unwrap();

    assert_eq!(report["id"], "r-9");
    assert_eq!(api.session(), Some(Session::new("A2", "R2")));
    assert_eq!(
        api.client.queries().get_query_data::<Value>(&keys::REPORTS.detail("r-9")).unwrap(),
        Some(json!({"id": "r-9"}))
    );
}

#[tokio::test]
async fn test_observer_refetches_after_invalidation() {
    let api = TestApi::signed_in().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/patients/p-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p-1"})))
        .mount(&api.server)
        .await;

    let mut observer = api.client.patients().observe_detail("p-1");
    let state = observer.settled().await;
    assert_eq!(state.data, Some(json!({"id": "p-1"})));

    keys::invalidate::patients(api.client.queries());
    let state = observer.settled().await;
    assert!(!state.is_error());

    assert_eq!(hits(&api, "GET", "/api/v1/patients/p-1").await, 2);
}
