//! Single-flight session refresh
//!
//! Several requests can hit a 401 at the same moment after the access token
//! expires. Refreshing once per caller would redeem a rotating refresh token
//! several times and every redemption after the first would fail, so all
//! concurrent callers share one refresh call instead.
//!
//! ```text
//!   Idle ──refresh()──► InFlight ──success──► Idle   (store updated, waiters resolved)
//!                          │
//!                          └──────failure──► Idle    (store cleared, waiters rejected)
//! ```
//!
//! Callers that arrive while a refresh is in flight attach to the shared
//! future rather than starting their own. Each refresh call is bounded by a
//! timeout so a hung backend cannot stall waiters forever.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use super::error::AuthError;
use super::session_store::SessionStore;
use super::types::Session;

/// Default bound on a single refresh call.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

type SharedRefresh = Shared<BoxFuture<'static, Result<Session, AuthError>>>;

/// Network half of a refresh: redeem a refresh token for a new session.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError>;
}

/// What the transport depends on to recover from a 401.
#[async_trait]
pub trait SessionRefresh: Send + Sync {
    /// Obtain a fresh session, joining any refresh already in flight.
    async fn refresh(&self) -> Result<Session, AuthError>;

    /// Like [`SessionRefresh::refresh`], for a request rejected while using
    /// `rejected_access_token`. Returns the stored session directly when it
    /// has already moved past that token.
    async fn refresh_rejected(&self, rejected_access_token: &str) -> Result<Session, AuthError> {
        let _ = rejected_access_token;
        self.refresh().await
    }
}

/// Counters for refresh activity.
#[derive(Debug, Default)]
pub struct RefreshStats {
    started: AtomicU64,
    joined: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of [`RefreshStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStatsSnapshot {
    /// Refresh network calls issued.
    pub started: u64,
    /// Callers that attached to a refresh already in flight.
    pub joined: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Callers answered from the store because the session had already rotated.
    pub skipped: u64,
}

impl RefreshStats {
    pub fn snapshot(&self) -> RefreshStatsSnapshot {
        RefreshStatsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Single-flight refresh state machine.
pub struct RefreshCoordinator {
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn TokenRefresher>,
    timeout: Duration,
    in_flight: Mutex<Option<(u64, SharedRefresh)>>,
    generation: AtomicU64,
    stats: Arc<RefreshStats>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("timeout", &self.timeout)
            .field("in_flight", &self.is_in_flight())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    pub fn new(store: Arc<dyn SessionStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            timeout: DEFAULT_REFRESH_TIMEOUT,
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
            stats: Arc::new(RefreshStats::default()),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a refresh is currently in flight.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    pub fn stats(&self) -> RefreshStatsSnapshot {
        self.stats.snapshot()
    }

    /// Join the in-flight refresh or start one.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Session, AuthError> {
        let (generation, shared) = {
            let mut slot = self.in_flight.lock();
            if let Some((generation, shared)) = slot.as_ref() {
                self.stats.joined.fetch_add(1, Ordering::Relaxed);
                debug!(generation, "Joining in-flight session refresh");
                (*generation, shared.clone())
            } else {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                self.stats.started.fetch_add(1, Ordering::Relaxed);
                debug!(generation, "Starting session refresh");
                let shared = run_refresh(
                    Arc::clone(&self.store),
                    Arc::clone(&self.refresher),
                    self.timeout,
                    Arc::clone(&self.stats),
                )
                .boxed()
                .shared();
                *slot = Some((generation, shared.clone()));
                (generation, shared)
            }
        };

        let result = shared.await;

        // Back to Idle, unless a newer refresh already replaced this one.
        let mut slot = self.in_flight.lock();
        if matches!(slot.as_ref(), Some((current, _)) if *current == generation) {
            *slot = None;
        }

        result
    }

    /// Refresh on behalf of a request rejected with `rejected_access_token`.
    #[instrument(skip_all)]
    pub async fn refresh_rejected(
        &self,
        rejected_access_token: &str,
    ) -> Result<Session, AuthError> {
        if !self.is_in_flight() {
            if let Some(current) = self.store.get()? {
                if current.access_token != rejected_access_token {
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                    debug!("Session already rotated past the rejected token");
                    return Ok(current);
                }
            }
        }
        self.refresh().await
    }
}

async fn run_refresh(
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn TokenRefresher>,
    timeout: Duration,
    stats: Arc<RefreshStats>,
) -> Result<Session, AuthError> {
    let outcome = match store.get() {
        Ok(Some(session)) => {
            match tokio::time::timeout(timeout, refresher.refresh(&session.refresh_token)).await {
                Ok(result) => result,
                Err(_) => Err(AuthError::Timeout(timeout)),
            }
        }
        Ok(None) => Err(AuthError::NotAuthenticated),
        Err(err) => Err(AuthError::from(err)),
    };

    let outcome = match outcome {
        Ok(session) => store.set(&session).map(|()| session).map_err(AuthError::from),
        Err(err) => Err(err),
    };

    match &outcome {
        Ok(_) => {
            stats.succeeded.fetch_add(1, Ordering::Relaxed);
            info!("Session refreshed");
        }
        Err(err) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, "Session refresh failed, clearing session");
            if let Err(clear_err) = store.clear() {
                warn!(error = %clear_err, "Failed to clear session after refresh failure");
            }
        }
    }

    outcome
}

#[async_trait]
impl SessionRefresh for RefreshCoordinator {
    async fn refresh(&self) -> Result<Session, AuthError> {
        RefreshCoordinator::refresh(self).await
    }

    async fn refresh_rejected(&self, rejected_access_token: &str) -> Result<Session, AuthError> {
        RefreshCoordinator::refresh_rejected(self, rejected_access_token).await
    }
}
