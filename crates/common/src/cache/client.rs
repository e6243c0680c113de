//! Query cache with staleness, garbage collection and invalidation
//!
//! Every entry stores the last successful payload as JSON along with the
//! fetcher that produced it, so the cache can refetch on its own when an
//! entry is invalidated or a focus/reconnect trigger fires.
//!
//! ```text
//!  observe / get_or_fetch
//!        │
//!        ▼
//!   fresh? ──yes──► cached data (hit)
//!        │no
//!        ▼
//!   fetch in flight? ──yes──► join it
//!        │no
//!        ▼
//!   start fetch (read retry policy) ──► complete: publish state to observers
//! ```
//!
//! The entry map lock is never held across an await. Fetches run as detached
//! tasks so an observer going away does not cancel them; their result is
//! still recorded, and the entry then ages out through garbage collection.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use super::config::QueryCacheConfig;
use super::key::QueryKey;
use super::policy::{QueryFailure, ReadRetryPolicy};
use super::stats::{CacheStats, MetricsCollector};
use crate::error::{CommonError, CommonResult};
use crate::events::{ClientEvent, EventBus};
use crate::resilience::policies::AlwaysRetry;
use crate::resilience::{Clock, RetryError, RetryExecutor, SystemClock};

type Fetcher<E> = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, E>> + Send + Sync>;
type SharedFetch<E> = Shared<BoxFuture<'static, Result<Value, E>>>;

/// Observable state of one query.
#[derive(Debug, Clone)]
pub struct QueryState<E> {
    /// Last successful payload. Kept while a refetch runs or after it fails.
    pub data: Option<Value>,
    /// Error of the last completed fetch, cleared by the next success.
    pub error: Option<E>,
    pub is_fetching: bool,
    pub is_invalidated: bool,
    /// Attempts made by the last failed fetch, zero after a success.
    pub failure_count: u32,
    /// Wall-clock time of the last successful fetch, in epoch milliseconds.
    pub updated_at_ms: Option<u64>,
}

impl<E> Default for QueryState<E> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_fetching: false,
            is_invalidated: false,
            failure_count: 0,
            updated_at_ms: None,
        }
    }
}

impl<E> QueryState<E> {
    /// No data yet and a fetch is running.
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.is_fetching
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Deserialize the cached payload.
    pub fn decode<T: DeserializeOwned>(&self) -> CommonResult<Option<T>> {
        self.data.clone().map(serde_json::from_value).transpose().map_err(CommonError::from)
    }
}

struct QueryEntry<E> {
    /// Distinguishes an entry from a later one recreated under the same key.
    id: u64,
    data: Option<Value>,
    error: Option<E>,
    updated_at: Option<Instant>,
    updated_at_ms: Option<u64>,
    invalidated: bool,
    /// Invalidated while a fetch was running; that fetch's result is already
    /// out of date.
    refetch_when_done: bool,
    failure_count: u32,
    observers: usize,
    unobserved_since: Option<Instant>,
    in_flight: Option<SharedFetch<E>>,
    fetch_generation: u64,
    fetcher: Option<Fetcher<E>>,
    state: watch::Sender<QueryState<E>>,
}

impl<E: QueryFailure> QueryEntry<E> {
    fn new(id: u64, now: Instant) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            id,
            data: None,
            error: None,
            updated_at: None,
            updated_at_ms: None,
            invalidated: false,
            refetch_when_done: false,
            failure_count: 0,
            observers: 0,
            unobserved_since: Some(now),
            in_flight: None,
            fetch_generation: 0,
            fetcher: None,
            state,
        }
    }

    fn snapshot(&self) -> QueryState<E> {
        QueryState {
            data: self.data.clone(),
            error: self.error.clone(),
            is_fetching: self.in_flight.is_some(),
            is_invalidated: self.invalidated,
            failure_count: self.failure_count,
            updated_at_ms: self.updated_at_ms,
        }
    }

    /// Restart the inactivity window of an unobserved entry.
    fn touch(&mut self, now: Instant) {
        if self.observers == 0 {
            self.unobserved_since = Some(now);
        }
    }

    fn publish(&self) {
        self.state.send_replace(self.snapshot());
    }

    fn is_stale(&self, now: Instant, config: &QueryCacheConfig) -> bool {
        if self.invalidated || self.data.is_none() {
            return true;
        }
        self.updated_at.map_or(true, |at| now.saturating_duration_since(at) >= config.stale_time)
    }
}

struct Inner<E, C> {
    entries: Mutex<HashMap<QueryKey, QueryEntry<E>>>,
    config: QueryCacheConfig,
    clock: C,
    events: EventBus,
    metrics: MetricsCollector,
    generations: AtomicU64,
    entry_ids: AtomicU64,
}

impl<E: QueryFailure, C: Clock> Inner<E, C> {
    fn new_entry(&self, now: Instant) -> QueryEntry<E> {
        QueryEntry::new(self.entry_ids.fetch_add(1, Ordering::Relaxed) + 1, now)
    }

    /// Start a fetch for `entry`, or return the one already running.
    ///
    /// Must be called with the entry map locked; the returned future is
    /// driven by a spawned task when a Tokio runtime is available.
    fn start_fetch(
        self: &Arc<Self>,
        key: &QueryKey,
        entry: &mut QueryEntry<E>,
    ) -> Option<SharedFetch<E>> {
        if let Some(pending) = &entry.in_flight {
            return Some(pending.clone());
        }
        let fetcher = entry.fetcher.clone()?;

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let executor = RetryExecutor::new(
            self.config.read_retry_config(),
            ReadRetryPolicy::new(self.config.max_read_retries),
        );
        let weak = Arc::downgrade(self);
        let fetch_key = key.clone();

        let fetch = async move {
            let outcome = executor.execute_with_outcome(|| fetcher()).await;
            let attempts = outcome.attempts;
            let result = outcome.into_result().map_err(RetryError::into_last_error);
            if let Some(inner) = weak.upgrade() {
                inner.complete_fetch(&fetch_key, generation, &result, attempts);
            }
            result
        }
        .boxed()
        .shared();

        debug!(key = %key, "query fetch started");
        self.metrics.record_fetch();
        entry.in_flight = Some(fetch.clone());
        entry.fetch_generation = generation;
        entry.refetch_when_done = false;
        entry.publish();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(fetch.clone());
        }
        Some(fetch)
    }

    fn complete_fetch(
        self: &Arc<Self>,
        key: &QueryKey,
        generation: u64,
        result: &Result<Value, E>,
        attempts: u32,
    ) {
        let mut entries = self.entries.lock();
        // Removed (or removed and recreated) while the fetch ran.
        let Some(entry) = entries.get_mut(key) else { return };
        if entry.fetch_generation != generation {
            return;
        }
        entry.in_flight = None;
        entry.touch(self.clock.now());

        match result {
            Ok(data) => {
                entry.data = Some(data.clone());
                entry.error = None;
                entry.failure_count = 0;
                entry.updated_at = Some(self.clock.now());
                entry.updated_at_ms = Some(self.clock.millis_since_epoch());
                entry.invalidated = entry.refetch_when_done;
                debug!(key = %key, "query fetch succeeded");
            }
            Err(error) => {
                entry.error = Some(error.clone());
                entry.failure_count = attempts;
                self.metrics.record_fetch_failure();
                warn!(key = %key, attempts, error = %error, "query fetch failed");
                self.events.emit(ClientEvent::QueryFailed {
                    key: key.to_string(),
                    message: error.user_message(),
                });
            }
        }

        if entry.refetch_when_done && entry.observers > 0 {
            debug!(key = %key, "query invalidated during fetch, refetching");
            // start_fetch publishes the new state itself.
            let _ = self.start_fetch(key, entry);
        } else {
            entry.publish();
        }
    }

    fn release(&self, key: &QueryKey, entry_id: u64) {
        let mut entries = self.entries.lock();
        // The observed entry may have been removed and replaced by another.
        if let Some(entry) = entries.get_mut(key).filter(|entry| entry.id == entry_id) {
            entry.observers = entry.observers.saturating_sub(1);
            if entry.observers == 0 {
                entry.unobserved_since = Some(self.clock.now());
            }
        }
    }

    /// Refetch observed entries that are stale. Returns how many started.
    fn refetch_active_stale(self: &Arc<Self>) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let mut started = 0;
        for (key, entry) in entries.iter_mut() {
            if entry.observers > 0
                && entry.in_flight.is_none()
                && entry.is_stale(now, &self.config)
                && self.start_fetch(key, entry).is_some()
            {
                started += 1;
            }
        }
        started
    }
}

/// Client-side query cache.
///
/// Cheap to clone; clones share the same entries.
pub struct QueryClient<E, C = SystemClock> {
    inner: Arc<Inner<E, C>>,
}

impl<E, C> Clone for QueryClient<E, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<E, C> fmt::Debug for QueryClient<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("entries", &self.inner.entries.lock().len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<E: QueryFailure> QueryClient<E, SystemClock> {
    pub fn new(config: QueryCacheConfig, events: EventBus) -> Self {
        Self::with_clock(config, events, SystemClock)
    }
}

impl<E: QueryFailure, C: Clock> QueryClient<E, C> {
    pub fn with_clock(config: QueryCacheConfig, events: EventBus, clock: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                config,
                clock,
                events,
                metrics: MetricsCollector::default(),
                generations: AtomicU64::new(0),
                entry_ids: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &QueryCacheConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Return fresh cached data for `key`, or fetch it.
    ///
    /// Joins a fetch already running for the key. Read failures are retried
    /// per the read retry policy before the last error is returned.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.read(key, erase(fetcher), false).await
    }

    /// Fetch `key` regardless of freshness and cache the result.
    pub async fn fetch_query<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.read(key, erase(fetcher), true).await
    }

    async fn read<T: DeserializeOwned>(
        &self,
        key: &QueryKey,
        fetcher: Fetcher<E>,
        force: bool,
    ) -> Result<T, E> {
        let pending = {
            let now = self.inner.clock.now();
            let mut entries = self.inner.entries.lock();
            let entry =
                entries.entry(key.clone()).or_insert_with(|| self.inner.new_entry(now));
            entry.fetcher = Some(fetcher);
            entry.touch(now);

            if !force && !entry.is_stale(now, &self.inner.config) {
                if let Some(data) = &entry.data {
                    self.inner.metrics.record_hit();
                    debug!(key = %key, "query cache hit");
                    return decode(data.clone());
                }
            }
            self.inner.metrics.record_miss();
            self.inner.start_fetch(key, entry)
        };

        let pending =
            pending.ok_or_else(|| E::from(CommonError::internal("query has no fetcher")))?;
        decode(pending.await?)
    }

    /// Subscribe to `key`.
    ///
    /// Fetches on the first observation and, when `refetch_on_mount` is
    /// set, whenever the entry is stale at the time of observation. The
    /// returned observer keeps the entry alive until it is dropped.
    pub fn observe<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> QueryObserver<E, C>
    where
        T: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.lock();
        let entry = entries.entry(key.clone()).or_insert_with(|| self.inner.new_entry(now));
        entry.fetcher = Some(erase(fetcher));
        entry.observers += 1;
        entry.unobserved_since = None;

        let first_load = entry.data.is_none();
        let stale = entry.is_stale(now, &self.inner.config);
        if first_load || (self.inner.config.refetch_on_mount && stale) {
            self.inner.metrics.record_miss();
            let _ = self.inner.start_fetch(key, entry);
        } else {
            self.inner.metrics.record_hit();
        }

        QueryObserver {
            key: key.clone(),
            entry_id: entry.id,
            client: self.clone(),
            state: entry.state.subscribe(),
        }
    }

    /// Start (or join) a fetch with the key's last known fetcher.
    ///
    /// Returns `Ok(false)` when the key was never fetched.
    pub async fn refetch(&self, key: &QueryKey) -> Result<bool, E> {
        let pending = {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(key) {
                Some(entry) => self.inner.start_fetch(key, entry),
                None => None,
            }
        };
        match pending {
            Some(pending) => pending.await.map(|_| true),
            None => Ok(false),
        }
    }

    /// Mark every entry under `prefix` invalid. Observed entries refetch
    /// immediately, the rest on their next read.
    ///
    /// Returns the number of entries invalidated.
    #[instrument(skip(self, prefix), fields(prefix = %prefix))]
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.inner.entries.lock();
        let mut count = 0;
        for (key, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
            count += 1;
            entry.invalidated = true;
            if entry.in_flight.is_some() {
                entry.refetch_when_done = true;
            } else if entry.observers > 0 && self.inner.start_fetch(key, entry).is_some() {
                continue;
            }
            entry.publish();
        }
        self.inner.metrics.record_invalidations(count);
        debug!(count, "queries invalidated");
        count
    }

    pub fn invalidate_all(&self) -> usize {
        self.invalidate(&QueryKey::from(Vec::new()))
    }

    /// Drop every entry under `prefix` without refetching.
    pub fn remove_queries(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Window regained focus. No-op unless focus refetching is enabled.
    pub fn on_window_focus(&self) -> usize {
        if !self.inner.config.refetch_on_window_focus {
            return 0;
        }
        self.inner.refetch_active_stale()
    }

    /// Network connectivity came back.
    pub fn on_reconnect(&self) -> usize {
        if !self.inner.config.refetch_on_reconnect {
            return 0;
        }
        self.inner.refetch_active_stale()
    }

    /// Evict entries that have had no observers and no reads or writes for
    /// `gc_time`, and have no fetch running. Returns the number evicted.
    pub fn collect_garbage(&self) -> usize {
        let now = self.inner.clock.now();
        let gc_time = self.inner.config.gc_time;
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| {
            let expired = entry.observers == 0
                && entry.in_flight.is_none()
                && entry
                    .unobserved_since
                    .is_some_and(|since| now.saturating_duration_since(since) >= gc_time);
            !expired
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            self.inner.metrics.record_evictions(evicted);
            debug!(evicted, "query cache garbage collected");
        }
        evicted
    }

    /// Write data for `key` as if it had just been fetched.
    pub fn set_query_data<T: Serialize>(&self, key: &QueryKey, data: &T) -> CommonResult<()> {
        let value = serde_json::to_value(data)?;
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.lock();
        let entry = entries.entry(key.clone()).or_insert_with(|| self.inner.new_entry(now));
        entry.touch(now);
        entry.data = Some(value);
        entry.error = None;
        entry.failure_count = 0;
        entry.invalidated = false;
        entry.updated_at = Some(now);
        entry.updated_at_ms = Some(self.inner.clock.millis_since_epoch());
        entry.publish();
        Ok(())
    }

    /// Cached data for `key`, fresh or not.
    pub fn get_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> CommonResult<Option<T>> {
        let data = self.inner.entries.lock().get(key).and_then(|entry| entry.data.clone());
        data.map(serde_json::from_value).transpose().map_err(CommonError::from)
    }

    pub fn get_query_state(&self, key: &QueryKey) -> Option<QueryState<E>> {
        self.inner.entries.lock().get(key).map(QueryEntry::snapshot)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.inner.entries.lock();
        let observed = entries.values().filter(|entry| entry.observers > 0).count();
        self.inner.metrics.snapshot(entries.len(), observed)
    }

    /// Run a mutation and invalidate `invalidates` once it succeeds.
    ///
    /// A failed mutation is retried `mutation_retries` times. The final
    /// failure is reported as [`ClientEvent::MutationFailed`] and invalidates
    /// nothing.
    pub async fn mutate<R, F, Fut>(&self, invalidates: &[QueryKey], operation: F) -> Result<R, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        self.mutate_then(operation, |_| invalidates.to_vec()).await
    }

    /// Like [`QueryClient::mutate`], deriving the prefixes to invalidate from
    /// the mutation's result.
    pub async fn mutate_then<R, F, Fut, K>(&self, operation: F, invalidates: K) -> Result<R, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        K: FnOnce(&R) -> Vec<QueryKey>,
    {
        let executor = RetryExecutor::new(self.inner.config.mutation_retry_config(), AlwaysRetry);
        match executor.execute(operation).await {
            Ok(result) => {
                for prefix in invalidates(&result) {
                    self.invalidate(&prefix);
                }
                Ok(result)
            }
            Err(error) => {
                let error = error.into_last_error();
                warn!(error = %error, "mutation failed");
                let message = error.user_message();
                self.inner.events.emit(ClientEvent::MutationFailed { message });
                Err(error)
            }
        }
    }
}

/// Live view of one query.
///
/// Dropping the observer releases the entry; once no observer remains the
/// entry becomes eligible for garbage collection after `gc_time`.
pub struct QueryObserver<E: QueryFailure, C: Clock = SystemClock> {
    key: QueryKey,
    entry_id: u64,
    client: QueryClient<E, C>,
    state: watch::Receiver<QueryState<E>>,
}

impl<E: QueryFailure, C: Clock> QueryObserver<E, C> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Current state.
    pub fn state(&self) -> QueryState<E> {
        self.state.borrow().clone()
    }

    /// Wait for the next state change. Returns `false` once the entry has
    /// been removed from the cache.
    pub async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }

    /// Wait until no fetch is running and return that state.
    pub async fn settled(&mut self) -> QueryState<E> {
        loop {
            let state = self.state.borrow_and_update().clone();
            if !state.is_fetching {
                return state;
            }
            if self.state.changed().await.is_err() {
                return self.state.borrow().clone();
            }
        }
    }

    pub async fn refetch(&self) -> Result<bool, E> {
        self.client.refetch(&self.key).await
    }
}

impl<E: QueryFailure, C: Clock> fmt::Debug for QueryObserver<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryObserver").field("key", &self.key).finish()
    }
}

impl<E: QueryFailure, C: Clock> Drop for QueryObserver<E, C> {
    fn drop(&mut self) {
        self.client.inner.release(&self.key, self.entry_id);
    }
}

fn erase<T, E, F, Fut>(fetcher: F) -> Fetcher<E>
where
    T: Serialize + Send + 'static,
    E: QueryFailure,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move || {
        let fetch = fetcher();
        async move {
            let data = fetch.await?;
            serde_json::to_value(data).map_err(|e| E::from(CommonError::from(e)))
        }
        .boxed()
    })
}

fn decode<T: DeserializeOwned, E: QueryFailure>(value: Value) -> Result<T, E> {
    serde_json::from_value(value).map_err(|e| E::from(CommonError::from(e)))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::resilience::MockClock;

    #[derive(Debug, Clone, PartialEq)]
    struct TestError {
        status: Option<u16>,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "request failed ({:?})", self.status)
        }
    }

    impl From<CommonError> for TestError {
        fn from(_: CommonError) -> Self {
            Self { status: None }
        }
    }

    impl QueryFailure for TestError {
        fn status(&self) -> Option<u16> {
            self.status
        }
    }

    fn client(clock: &MockClock) -> QueryClient<TestError, MockClock> {
        let config = QueryCacheConfig::builder()
            .retry_delay(Duration::from_millis(10), Duration::from_millis(100))
            .build();
        QueryClient::with_clock(config, EventBus::new(), clock.clone())
    }

    fn counting(
        calls: &Arc<AtomicU32>,
    ) -> impl Fn() -> BoxFuture<'static, Result<u32, TestError>> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(n) }.boxed()
        }
    }

    #[tokio::test]
    async fn fresh_entry_is_served_from_cache() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let key = QueryKey::root("patients").child("list");

        assert_eq!(cache.get_or_fetch(&key, counting(&calls)).await, Ok(1));
        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get_or_fetch(&key, counting(&calls)).await, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn stale_entry_is_refetched() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let key = QueryKey::root("inventory");

        assert_eq!(cache.get_or_fetch(&key, counting(&calls)).await, Ok(1));
        clock.advance(Duration::from_secs(300));
        assert_eq!(cache.get_or_fetch(&key, counting(&calls)).await, Ok(2));
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_fetch() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let key = QueryKey::root("reports");

        let slow = {
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, TestError>(json!({"total": 3}))
                }
                .boxed()
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch::<Value, _, _>(&key, slow.clone()),
            cache.get_or_fetch::<Value, _, _>(&key, slow)
        );
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let mut events = cache.events().subscribe();

        let result = cache
            .get_or_fetch::<u32, _, _>(&QueryKey::root("users"), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(TestError { status: Some(404) }) }.boxed()
            })
            .await;

        assert_eq!(result, Err(TestError { status: Some(404) }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            events.try_recv(),
            Ok(ClientEvent::QueryFailed { ref key, .. }) if key == "[\"users\"]"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_retry_twice_and_keep_stale_data() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let key = QueryKey::root("dashboard").child("stats");
        cache.set_query_data(&key, &json!({"patients": 10})).unwrap();
        cache.invalidate(&key);

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = cache
            .get_or_fetch::<Value, _, _>(&key, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<Value, _>(TestError { status: Some(500) }) }.boxed()
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let state = cache.get_query_state(&key).unwrap();
        assert_eq!(state.data, Some(json!({"patients": 10})));
        assert_eq!(state.failure_count, 3);
        assert!(state.is_error());
        assert!(!state.is_fetching);
    }

    #[tokio::test]
    async fn invalidating_a_prefix_covers_lists_and_details() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let root = QueryKey::root("patients");
        let list = root.child("list").child(json!({}));
        let detail = root.child("detail").child(7);
        let other = QueryKey::root("inventory").child("list");
        for key in [&list, &detail, &other] {
            cache.set_query_data(key, &json!([])).unwrap();
        }

        assert_eq!(cache.invalidate(&root), 2);

        assert!(cache.get_query_state(&list).unwrap().is_invalidated);
        assert!(cache.get_query_state(&detail).unwrap().is_invalidated);
        assert!(!cache.get_query_state(&other).unwrap().is_invalidated);
    }

    #[tokio::test]
    async fn invalidating_a_detail_leaves_siblings_alone() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let root = QueryKey::root("patients");
        let seven = root.child("detail").child(7);
        let eight = root.child("detail").child(8);
        cache.set_query_data(&seven, &1).unwrap();
        cache.set_query_data(&eight, &2).unwrap();

        assert_eq!(cache.invalidate(&seven), 1);
        assert!(!cache.get_query_state(&eight).unwrap().is_invalidated);
    }

    #[tokio::test]
    async fn observer_sees_first_load_and_invalidation_refetch() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let key = QueryKey::root("users").child("list");

        let mut observer = cache.observe(&key, counting(&calls));
        let state = observer.settled().await;
        assert_eq!(state.decode::<u32>().unwrap(), Some(1));
        assert!(!state.is_loading());

        cache.invalidate(&QueryKey::root("users"));
        let state = observer.settled().await;
        assert_eq!(state.decode::<u32>().unwrap(), Some(2));
        assert!(!state.is_invalidated);
    }

    #[tokio::test]
    async fn observing_fresh_entry_does_not_refetch() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let key = QueryKey::root("inventory");

        cache.get_or_fetch(&key, counting(&calls)).await.unwrap();
        let mut observer = cache.observe(&key, counting(&calls));
        assert_eq!(observer.settled().await.decode::<u32>().unwrap(), Some(1));
        drop(observer);

        clock.advance(Duration::from_secs(301));
        let mut observer = cache.observe(&key, counting(&calls));
        assert_eq!(observer.settled().await.decode::<u32>().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn garbage_collection_waits_for_observers_and_gc_time() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let key = QueryKey::root("reports");

        let mut observer = cache.observe(&key, counting(&calls));
        observer.settled().await;
        clock.advance(Duration::from_secs(3600));
        assert_eq!(cache.collect_garbage(), 0);

        drop(observer);
        clock.advance(Duration::from_secs(599));
        assert_eq!(cache.collect_garbage(), 0);
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.collect_garbage(), 1);
        assert!(!cache.contains(&key));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn focus_refetch_respects_config() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let calls = Arc::new(AtomicU32::new(0));
        let key = QueryKey::root("patients");

        let mut observer = cache.observe(&key, counting(&calls));
        observer.settled().await;
        clock.advance(Duration::from_secs(301));

        assert_eq!(cache.on_window_focus(), 0);
        assert_eq!(cache.on_reconnect(), 1);
        assert_eq!(observer.settled().await.decode::<u32>().unwrap(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_mutation_retries_once_and_invalidates_nothing() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let key = QueryKey::root("patients");
        cache.set_query_data(&key, &json!([])).unwrap();
        let mut events = cache.events().subscribe();
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&attempts);
        let result: Result<(), _> = cache
            .mutate(&[key.clone()], || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError { status: Some(422) }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(!cache.get_query_state(&key).unwrap().is_invalidated);
        assert!(matches!(events.try_recv(), Ok(ClientEvent::MutationFailed { .. })));
    }

    #[tokio::test]
    async fn successful_mutation_invalidates_declared_prefixes() {
        let clock = MockClock::new();
        let cache = client(&clock);
        let list = QueryKey::root("patients").child("list");
        cache.set_query_data(&list, &json!([])).unwrap();

        let created = cache
            .mutate_then(
                || async { Ok::<_, TestError>(json!({"id": 9})) },
                |_| vec![QueryKey::root("patients")],
            )
            .await
            .unwrap();

        assert_eq!(created, json!({"id": 9}));
        assert!(cache.get_query_state(&list).unwrap().is_invalidated);
    }

    #[tokio::test]
    async fn remove_queries_drops_matching_entries() {
        let clock = MockClock::new();
        let cache = client(&clock);
        cache.set_query_data(&QueryKey::root("users").child("profile"), &1).unwrap();
        cache.set_query_data(&QueryKey::root("users").child("list"), &2).unwrap();
        cache.set_query_data(&QueryKey::root("reports"), &3).unwrap();

        assert_eq!(cache.remove_queries(&QueryKey::root("users")), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_query_data::<u32>(&QueryKey::root("reports")).unwrap(), Some(3));
        assert_eq!(cache.invalidate_all(), 1);
    }
}
