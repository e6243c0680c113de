//! Sign-in, sign-out and the backend refresh call
//!
//! [`RefreshClient`] is the network half of the refresh coordinator: it
//! redeems a refresh token and nothing else. It talks to the backend
//! through the bare [`HttpClient`] so a refresh can never recurse into the
//! transport's own 401 handling.

use std::sync::Arc;

use async_trait::async_trait;
use cuidar_common::auth::{AuthError, Session, SessionStore, TokenRefresher};
use cuidar_common::QueryFailure;
use cuidar_domain::constants::{AUTH_LOGIN, AUTH_LOGOUT, AUTH_REFRESH};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::errors::ApiError;
use super::request::RequestDescriptor;
use super::transport::Transport;
use crate::http::HttpClient;

#[derive(Debug, Serialize)]
struct RefreshTokenRequest<'a> {
    refresh_token: &'a str,
}

/// Calls `POST /auth/refresh {refresh_token} -> {access_token, refresh_token}`.
#[derive(Debug, Clone)]
pub struct RefreshClient {
    http: HttpClient,
    url: String,
}

impl RefreshClient {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self { http, url: format!("{}{}", base_url.trim_end_matches('/'), AUTH_REFRESH) }
    }
}

#[async_trait]
impl TokenRefresher for RefreshClient {
    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let builder = self
            .http
            .request(Method::POST, &self.url)
            .json(&RefreshTokenRequest { refresh_token });

        let response = self.http.send(builder).await.map_err(|err| match err {
            ApiError::Timeout(after) => AuthError::Timeout(after),
            other => AuthError::Network(other.to_string()),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: ApiError::from_status(status, &body).user_message(),
            });
        }

        response.json::<Session>().await.map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }
}

/// Credentials for `POST /auth/login`.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Response of `POST /auth/login`.
#[derive(Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Signed-in user as returned by the backend.
    pub user: Value,
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse").field("user", &self.user).finish_non_exhaustive()
    }
}

impl LoginResponse {
    pub fn session(&self) -> Session {
        Session::new(&self.access_token, &self.refresh_token)
    }
}

/// Sign-in state operations.
#[derive(Debug, Clone)]
pub struct AuthApi {
    transport: Arc<Transport>,
}

impl AuthApi {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// Sign in and store the returned session.
    #[instrument(skip_all, fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let request = RequestDescriptor::post(AUTH_LOGIN).anonymous().json(credentials)?;
        let response: LoginResponse = self.transport.send_json(request).await?;
        self.transport.store().set(&response.session())?;
        info!("signed in");
        Ok(response)
    }

    /// Sign out.
    ///
    /// The backend is told on a best-effort basis; the local session is
    /// cleared whether or not that call succeeds.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ApiError> {
        if self.is_authenticated() {
            if let Err(err) = self.transport.send(RequestDescriptor::post(AUTH_LOGOUT)).await {
                warn!(error = %err, "backend logout failed");
            }
        }
        self.transport.store().clear()?;
        info!("signed out");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.transport.store().is_authenticated()
    }

    pub fn access_token(&self) -> Result<Option<String>, ApiError> {
        Ok(self.transport.store().get()?.map(|session| session.access_token))
    }
}
