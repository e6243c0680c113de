//! Integration tests for the session store and refresh coordinator
//!
//! Covers the rotating-refresh-token race: many callers discover an expired
//! access token at once and must share a single refresh.

#![cfg(feature = "runtime")]

use std::sync::Arc;
use std::time::Duration;

use cuidar_common::auth::{
    AuthError, MemorySessionStore, RefreshCoordinator, Session, SessionRefresh, SessionStore,
};
use cuidar_common::testing::MockTokenRefresher;
use futures::future::join_all;

/// Validates that N concurrent callers produce exactly one refresh call.
///
/// # Test Steps
/// 1. Store session `{A1, R1}`
/// 2. Fire 25 concurrent refreshes through the `SessionRefresh` seam
/// 3. Verify one network refresh redeemed `R1`
/// 4. Verify every caller received `{A2, R2}` and the store holds it
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_is_single_flight() {
    let store = Arc::new(MemorySessionStore::with_session(Session::new("A1", "R1")));
    let refresher = MockTokenRefresher::succeeding(Session::new("A2", "R2"))
        .with_delay(Duration::from_millis(50));
    let coordinator: Arc<dyn SessionRefresh> =
        Arc::new(RefreshCoordinator::new(store.clone(), Arc::new(refresher.clone())));

    let handles = (0..25).map(|_| {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.refresh_rejected("A1").await })
    });
    let results = join_all(handles).await;

    assert_eq!(refresher.calls(), 1);
    assert_eq!(refresher.seen_tokens(), vec!["R1".to_string()]);
    for result in results {
        assert_eq!(result.unwrap(), Ok(Session::new("A2", "R2")));
    }
    assert_eq!(store.get().unwrap(), Some(Session::new("A2", "R2")));
}

/// Validates that a failed refresh reaches every waiter and signs out.
#[tokio::test]
async fn test_failed_refresh_clears_session_for_everyone() {
    let store = Arc::new(MemorySessionStore::with_session(Session::new("A1", "R1")));
    let refresher = MockTokenRefresher::failing(AuthError::Rejected {
        status: 401,
        message: "refresh token reused".into(),
    })
    .with_delay(Duration::from_millis(10));
    let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), Arc::new(refresher.clone())));

    let results = join_all((0..4).map(|_| {
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.refresh().await }
    }))
    .await;

    assert_eq!(refresher.calls(), 1);
    assert!(results.iter().all(|r| matches!(r, Err(AuthError::Rejected { status: 401, .. }))));
    assert!(!store.is_authenticated());
}

/// Validates that a caller rejected with an outdated token reuses the
/// session another caller already obtained.
#[tokio::test]
async fn test_late_rejection_reuses_rotated_session() {
    let store = Arc::new(MemorySessionStore::with_session(Session::new("A1", "R1")));
    let refresher = MockTokenRefresher::sequence(vec![Ok(Session::new("A2", "R2"))]);
    let coordinator = RefreshCoordinator::new(store.clone(), Arc::new(refresher.clone()));

    let first = coordinator.refresh_rejected("A1").await.unwrap();
    // A response for a request sent with A1 arrives after the rotation.
    let late = coordinator.refresh_rejected("A1").await.unwrap();

    assert_eq!(first, Session::new("A2", "R2"));
    assert_eq!(late, Session::new("A2", "R2"));
    assert_eq!(refresher.calls(), 1);
}

#[cfg(feature = "platform")]
mod keychain {
    use cuidar_common::auth::{KeychainSessionStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
    use cuidar_common::security::SecretStore;
    use cuidar_common::testing::MockKeychainProvider;

    use super::*;

    /// Validates that a refresh through a keychain-backed store rewrites both
    /// slots.
    #[tokio::test]
    async fn test_refresh_persists_to_both_slots() {
        let secrets = MockKeychainProvider::new();
        let store = Arc::new(KeychainSessionStore::new(secrets.clone()));
        store.set(&Session::new("A1", "R1")).unwrap();
        let refresher = MockTokenRefresher::succeeding(Session::new("A2", "R2"));
        let coordinator = RefreshCoordinator::new(store.clone(), Arc::new(refresher));

        coordinator.refresh().await.unwrap();

        assert_eq!(secrets.get_secret(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("A2"));
        assert_eq!(secrets.get_secret(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R2"));
    }
}
