//! Authenticated transport
//!
//! Sends [`RequestDescriptor`]s to the backend with the current session's
//! bearer token and recovers an expired token transparently:
//!
//! 1. A 401 on a request that has not been resent triggers one session
//!    refresh through the injected [`SessionRefresh`].
//! 2. On success the same descriptor is resent exactly once with the new
//!    token and that outcome is returned.
//! 3. If the refresh fails, or the resent request is rejected again, the
//!    session is cleared and [`ClientEvent::Unauthenticated`] is emitted.
//!
//! Any other failure is returned unchanged. Read retries belong to the query
//! cache, not here.

use std::sync::Arc;

use cuidar_common::auth::{AuthError, Session, SessionRefresh, SessionStore};
use cuidar_common::events::{ClientEvent, EventBus};
use cuidar_common::QueryFailure;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::diagnostics::HttpDiagnostics;
use super::errors::ApiError;
use super::request::RequestDescriptor;
use crate::http::HttpClient;

pub struct Transport {
    http: HttpClient,
    base_url: String,
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn SessionRefresh>,
    events: EventBus,
    diagnostics: HttpDiagnostics,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .field("diagnostics", &self.diagnostics.is_enabled())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a transport for `base_url` (e.g. `https://api.example/api/v1`).
    ///
    /// # Errors
    /// Returns `ApiError::Config` if `base_url` is not an absolute URL.
    pub fn new(
        http: HttpClient,
        base_url: &str,
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn SessionRefresh>,
        events: EventBus,
    ) -> Result<Self, ApiError> {
        Url::parse(base_url)
            .map_err(|e| ApiError::Config(format!("Invalid API base URL '{base_url}': {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            refresher,
            events,
            diagnostics: HttpDiagnostics::disabled(),
        })
    }

    pub fn with_diagnostics(mut self, diagnostics: HttpDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Send `request` and return the response body as JSON.
    ///
    /// Empty bodies are returned as `Value::Null`, non-JSON bodies as a
    /// string.
    ///
    /// # Errors
    /// - `ApiError::Unauthenticated` when the session could not be recovered
    /// - the request's own error otherwise (see [`ApiError`])
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, mut request: RequestDescriptor) -> Result<Value, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        let session = if request.is_authenticated() { self.store.get()? } else { None };

        let first = self.execute(&request, session.as_ref(), &request_id).await;
        let rejected = match (first, session) {
            (Err(err), Some(session)) if err.is_unauthorized() && !request.is_retried() => session,
            (outcome, _) => return outcome,
        };

        request.mark_retried();
        debug!(request_id = %request_id, "access token rejected, refreshing session");
        let refreshed = match self.refresher.refresh_rejected(&rejected.access_token).await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "session refresh failed");
                self.sign_out();
                return Err(ApiError::Unauthenticated(err));
            }
        };

        match self.execute(&request, Some(&refreshed), &request_id).await {
            Err(err) if err.is_unauthorized() => {
                warn!(request_id = %request_id, "refreshed token rejected");
                self.sign_out();
                Err(ApiError::Unauthenticated(AuthError::Rejected {
                    status: 401,
                    message: err.user_message(),
                }))
            }
            outcome => outcome,
        }
    }

    /// Send `request` and decode its body into `T`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestDescriptor,
    ) -> Result<T, ApiError> {
        let body = self.send(request).await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(RequestDescriptor::get(path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(RequestDescriptor::post(path).json(body)?).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(RequestDescriptor::put(path).json(body)?).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(RequestDescriptor::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(RequestDescriptor::delete(path)).await
    }

    async fn execute(
        &self,
        request: &RequestDescriptor,
        session: Option<&Session>,
        request_id: &str,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let bearer = session.map(Session::bearer);

        let mut builder =
            self.http.request(request.method.clone(), &url).header("x-request-id", request_id);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(bearer) = &bearer {
            builder = builder.header(AUTHORIZATION, bearer.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        self.diagnostics.log_request(request, bearer.as_deref(), request_id);

        let response = match self.http.send(builder).await {
            Ok(response) => response,
            Err(err) => {
                self.diagnostics.log_failure(request, request_id, &err.to_string());
                return Err(err);
            }
        };

        let status = response.status();
        let text = response.text().await?;
        let body = parse_body(&text);
        self.diagnostics.log_response(request, request_id, status, &body);

        if status.is_success() {
            Ok(body)
        } else {
            Err(ApiError::from_status(status, &text))
        }
    }

    fn sign_out(&self) {
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed to clear session");
        }
        self.events.emit(ClientEvent::Unauthenticated);
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
