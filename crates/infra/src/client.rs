//! Client facade
//!
//! Wires session store → refresh coordinator → transport → query cache →
//! event bus from one [`Config`], and hands out the entity APIs.

use std::sync::Arc;
use std::time::Duration;

use cuidar_common::auth::{
    KeychainSessionStore, RefreshCoordinator, SessionRefresh, SessionStore, TokenRefresher,
};
use cuidar_common::cache::{QueryCacheConfig, QueryClient};
use cuidar_common::events::EventBus;
use cuidar_common::privacy::Redactor;
use cuidar_domain::constants::{INVENTORY, PATIENTS, REPORTS, USERS};
use cuidar_domain::Config;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::api::{ApiError, AuthApi, HttpDiagnostics, RefreshClient, Transport};
use crate::http::HttpClient;
use crate::queries::{keys, DashboardApi, ResourceApi};

/// Shortest period accepted by [`ApiClient::spawn_gc`].
pub const MIN_GC_INTERVAL: Duration = Duration::from_secs(1);

/// Query cache settings derived from the client configuration.
pub fn query_cache_config(config: &Config) -> QueryCacheConfig {
    let cache = &config.cache;
    QueryCacheConfig::builder()
        .stale_time(Duration::from_millis(cache.stale_time_ms))
        .gc_time(Duration::from_millis(cache.gc_time_ms))
        .max_read_retries(cache.max_read_retries)
        .retry_delay(
            Duration::from_millis(cache.retry_base_delay_ms),
            Duration::from_millis(cache.retry_max_delay_ms),
        )
        .mutation_retries(cache.mutation_retries)
        .refetch_on_window_focus(config.refetch_on_window_focus())
        .refetch_on_reconnect(cache.refetch_on_reconnect)
        .refetch_on_mount(cache.refetch_on_mount)
        .build()
}

/// Entry point for the API-access layer.
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: Arc<Config>,
    transport: Arc<Transport>,
    coordinator: Arc<RefreshCoordinator>,
    queries: QueryClient<ApiError>,
    events: EventBus,
}

impl ApiClient {
    pub fn builder(config: Config) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    /// Build a client with the default keychain-backed session store.
    ///
    /// # Errors
    /// Returns `ApiError::Config` if the configuration is invalid.
    pub fn from_config(config: Config) -> Result<Self, ApiError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn queries(&self) -> &QueryClient<ApiError> {
        &self.queries
    }

    /// Subscribe to sign-in, mutation and read failure events.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn auth(&self) -> AuthApi {
        AuthApi::new(Arc::clone(&self.transport))
    }

    fn resource(&self, endpoint: &'static str, keys: keys::EntityKeys) -> ResourceApi {
        ResourceApi::new(Arc::clone(&self.transport), self.queries.clone(), endpoint, keys)
    }

    pub fn patients(&self) -> ResourceApi {
        self.resource(PATIENTS, keys::PATIENTS)
    }

    pub fn inventory(&self) -> ResourceApi {
        self.resource(INVENTORY, keys::INVENTORY)
    }

    pub fn reports(&self) -> ResourceApi {
        self.resource(REPORTS, keys::REPORTS)
    }

    pub fn users(&self) -> ResourceApi {
        self.resource(USERS, keys::USERS)
    }

    pub fn dashboard(&self) -> DashboardApi {
        DashboardApi::new(Arc::clone(&self.transport), self.queries.clone())
    }

    /// The application window regained focus.
    ///
    /// Refetches stale observed queries in production only.
    pub fn on_window_focus(&self) -> usize {
        self.queries.on_window_focus()
    }

    /// Network connectivity came back.
    pub fn on_reconnect(&self) -> usize {
        self.queries.on_reconnect()
    }

    /// Run the cache garbage collector every `every` until the handle is
    /// aborted. Periods shorter than [`MIN_GC_INTERVAL`] are raised to it.
    pub fn spawn_gc(&self, every: Duration) -> JoinHandle<()> {
        let queries = self.queries.clone();
        let every = every.max(MIN_GC_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = queries.collect_garbage();
                if evicted > 0 {
                    debug!(evicted, "query cache gc tick");
                }
            }
        })
    }
}

/// Builder for [`ApiClient`].
///
/// Any collaborator left unset gets its production default.
pub struct ApiClientBuilder {
    config: Config,
    store: Option<Arc<dyn SessionStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    events: Option<EventBus>,
    redactor: Option<Redactor>,
}

impl ApiClientBuilder {
    pub fn new(config: Config) -> Self {
        Self { config, store: None, refresher: None, events: None, redactor: None }
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn token_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = Some(redactor);
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let config = self.config;
        config.validate().map_err(|e| ApiError::Config(e.to_string()))?;

        let http = HttpClient::builder()
            .timeout(config.api.timeout())
            .user_agent(config.api.user_agent.clone())
            .build()?;

        let store = self.store.unwrap_or_else(|| default_store(&config));
        let refresher = self.refresher.unwrap_or_else(|| {
            Arc::new(RefreshClient::new(http.clone(), &config.api.base_url))
                as Arc<dyn TokenRefresher>
        });
        let coordinator = Arc::new(
            RefreshCoordinator::new(Arc::clone(&store), refresher)
                .with_timeout(config.session.refresh_timeout()),
        );
        let events = self.events.unwrap_or_default();
        let diagnostics = HttpDiagnostics::new(
            self.redactor.unwrap_or_default(),
            config.diagnostics_enabled(),
        );

        let transport = Transport::new(
            http,
            &config.api.base_url,
            store,
            Arc::clone(&coordinator) as Arc<dyn SessionRefresh>,
            events.clone(),
        )?
        .with_diagnostics(diagnostics);

        let queries = QueryClient::new(query_cache_config(&config), events.clone());

        info!(
            base_url = %config.api.base_url,
            environment = ?config.environment,
            "API client ready"
        );

        Ok(ApiClient {
            config: Arc::new(config),
            transport: Arc::new(transport),
            coordinator,
            queries,
            events,
        })
    }
}

fn default_store(config: &Config) -> Arc<dyn SessionStore> {
    Arc::new(KeychainSessionStore::for_service(config.session.service_name.clone()))
}
