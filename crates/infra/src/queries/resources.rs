//! Cached entity APIs
//!
//! Reads go through the query cache under the entity's key factory. Writes
//! go through the mutation contract: one retry on failure, then the error is
//! reported on the event bus; on success the entity prefix (and, for
//! updates, the touched detail) is invalidated.

use std::sync::Arc;

use cuidar_common::cache::{QueryClient, QueryKey, QueryObserver};
use cuidar_domain::constants::{DASHBOARD_RECENT_ACTIVITY, DASHBOARD_STATS, USERS_PROFILE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use super::keys::{self, EntityKeys};
use crate::api::{ApiError, RequestDescriptor, Transport};

async fn fetch<T: DeserializeOwned>(
    transport: Arc<Transport>,
    request: RequestDescriptor,
) -> Result<T, ApiError> {
    transport.send_json(request).await
}

/// Read `request` through the cache under `key`.
pub async fn cached_get<T>(
    queries: &QueryClient<ApiError>,
    transport: &Arc<Transport>,
    key: &QueryKey,
    request: RequestDescriptor,
) -> Result<T, ApiError>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    let transport = Arc::clone(transport);
    queries.get_or_fetch(key, move || fetch::<T>(Arc::clone(&transport), request.clone())).await
}

/// Observe `request` through the cache under `key`.
pub fn cached_observe(
    queries: &QueryClient<ApiError>,
    transport: &Arc<Transport>,
    key: &QueryKey,
    request: RequestDescriptor,
) -> QueryObserver<ApiError> {
    let transport = Arc::clone(transport);
    queries.observe(key, move || fetch::<Value>(Arc::clone(&transport), request.clone()))
}

/// CRUD access to one entity endpoint such as `/patients`.
#[derive(Debug, Clone)]
pub struct ResourceApi {
    transport: Arc<Transport>,
    queries: QueryClient<ApiError>,
    endpoint: &'static str,
    keys: EntityKeys,
}

impl ResourceApi {
    pub fn new(
        transport: Arc<Transport>,
        queries: QueryClient<ApiError>,
        endpoint: &'static str,
        keys: EntityKeys,
    ) -> Self {
        Self { transport, queries, endpoint, keys }
    }

    pub fn keys(&self) -> EntityKeys {
        self.keys
    }

    pub fn endpoint(&self) -> &'static str {
        self.endpoint
    }

    fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.endpoint, id)
    }

    fn list_request(&self, filters: &Value) -> RequestDescriptor {
        RequestDescriptor::get(self.endpoint).query_object(filters)
    }

    /// `GET {endpoint}?{filters}`, cached under `list(filters)`.
    #[instrument(skip(self, filters), fields(entity = self.keys.name()))]
    pub async fn list<T>(&self, filters: &Value) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let key = self.keys.list(filters);
        cached_get(&self.queries, &self.transport, &key, self.list_request(filters)).await
    }

    /// `GET {endpoint}/{id}`, cached under `detail(id)`.
    #[instrument(skip(self), fields(entity = self.keys.name()))]
    pub async fn detail<T>(&self, id: &str) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let key = self.keys.detail(id);
        let request = RequestDescriptor::get(self.item_path(id));
        cached_get(&self.queries, &self.transport, &key, request).await
    }

    pub fn observe_list(&self, filters: &Value) -> QueryObserver<ApiError> {
        let key = self.keys.list(filters);
        cached_observe(&self.queries, &self.transport, &key, self.list_request(filters))
    }

    pub fn observe_detail(&self, id: &str) -> QueryObserver<ApiError> {
        let key = self.keys.detail(id);
        let request = RequestDescriptor::get(self.item_path(id));
        cached_observe(&self.queries, &self.transport, &key, request)
    }

    /// `POST {endpoint}`; invalidates the whole entity on success.
    #[instrument(skip(self, body), fields(entity = self.keys.name()))]
    pub async fn create<B, T>(&self, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = RequestDescriptor::post(self.endpoint).json(body)?;
        self.queries
            .mutate(&[self.keys.all()], || fetch::<T>(Arc::clone(&self.transport), request.clone()))
            .await
    }

    /// `PUT {endpoint}/{id}`; invalidates the entity and that detail.
    #[instrument(skip(self, body), fields(entity = self.keys.name()))]
    pub async fn update<B, T>(&self, id: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = RequestDescriptor::put(self.item_path(id)).json(body)?;
        self.queries
            .mutate(&[self.keys.all(), self.keys.detail(id)], || {
                fetch::<T>(Arc::clone(&self.transport), request.clone())
            })
            .await
    }

    /// `DELETE {endpoint}/{id}`; invalidates the entity on success.
    ///
    /// Any response body is discarded.
    #[instrument(skip(self), fields(entity = self.keys.name()))]
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let request = RequestDescriptor::delete(self.item_path(id));
        self.queries
            .mutate(&[self.keys.all()], || {
                let transport = Arc::clone(&self.transport);
                let request = request.clone();
                async move { transport.send(request).await.map(|_| ()) }
            })
            .await
    }
}

/// Dashboard and profile reads.
#[derive(Debug, Clone)]
pub struct DashboardApi {
    transport: Arc<Transport>,
    queries: QueryClient<ApiError>,
}

impl DashboardApi {
    pub fn new(transport: Arc<Transport>, queries: QueryClient<ApiError>) -> Self {
        Self { transport, queries }
    }

    pub async fn stats<T>(&self) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let request = RequestDescriptor::get(DASHBOARD_STATS);
        cached_get(&self.queries, &self.transport, &keys::dashboard::stats(), request).await
    }

    pub async fn recent_activity<T>(&self) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let key = keys::dashboard::recent_activity();
        let request = RequestDescriptor::get(DASHBOARD_RECENT_ACTIVITY);
        cached_get(&self.queries, &self.transport, &key, request).await
    }

    /// Signed-in user's profile.
    pub async fn profile<T>(&self) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let request = RequestDescriptor::get(USERS_PROFILE);
        cached_get(&self.queries, &self.transport, &keys::user_profile(), request).await
    }
}
