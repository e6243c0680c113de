#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use cuidar_common::auth::{MemorySessionStore, Session};
use cuidar_domain::{Config, Environment};
use cuidar_infra::ApiClient;
use serde_json::json;
use wiremock::{MockServer, ResponseTemplate};

/// Client wired to a mock backend with an in-memory session store.
pub struct TestApi {
    pub server: MockServer,
    pub store: Arc<MemorySessionStore>,
    pub client: ApiClient,
}

impl TestApi {
    /// Start a mock backend and a client signed in as `{A1, R1}`.
    pub async fn signed_in() -> Self {
        Self::start(Some(Session::new("A1", "R1")), Environment::Test).await
    }

    pub async fn start(session: Option<Session>, environment: Environment) -> Self {
        let server = MockServer::start().await;
        let store = Arc::new(match session {
            Some(session) => MemorySessionStore::with_session(session),
            None => MemorySessionStore::new(),
        });
        let client = ApiClient::builder(test_config(&server, environment))
            .session_store(store.clone())
            .build()
            .expect("client should build");

        Self { server, store, client }
    }

    pub fn session(&self) -> Option<Session> {
        cuidar_common::auth::SessionStore::get(self.store.as_ref()).expect("memory store")
    }
}

/// Configuration pointing at `server` with short retry delays.
pub fn test_config(server: &MockServer, environment: Environment) -> Config {
    let mut config = Config::default();
    config.environment = environment;
    config.api.base_url = format!("{}/api/v1", server.uri());
    config.cache.retry_base_delay_ms = 10;
    config.cache.retry_max_delay_ms = 40;
    config
}

/// Backend answer to `POST /auth/refresh`.
pub fn session_response(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access,
        "refresh_token": refresh
    }))
}

/// In-memory sink for formatted log output.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer poisoned")).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer poisoned").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
