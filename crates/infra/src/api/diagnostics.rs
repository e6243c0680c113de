//! Redacted request/response logging
//!
//! One debug line per request and one per response under the
//! `cuidar::http` target. Bodies and headers pass through the [`Redactor`]
//! before they reach the subscriber. Disabled in production.

use cuidar_common::privacy::Redactor;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use super::request::RequestDescriptor;

/// Tracing target of the diagnostic lines.
pub const HTTP_LOG_TARGET: &str = "cuidar::http";

#[derive(Debug, Clone)]
pub struct HttpDiagnostics {
    redactor: Redactor,
    enabled: bool,
}

impl HttpDiagnostics {
    pub fn new(redactor: Redactor, enabled: bool) -> Self {
        Self { redactor, enabled }
    }

    pub fn disabled() -> Self {
        Self::new(Redactor::default(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Headers as they will be logged.
    pub fn redacted_headers(
        &self,
        request: &RequestDescriptor,
        bearer: Option<&str>,
        request_id: &str,
    ) -> Vec<(String, String)> {
        let mut headers: Vec<(&str, &str)> = vec![("x-request-id", request_id)];
        if let Some(bearer) = bearer {
            headers.push(("Authorization", bearer));
        }
        headers.extend(request.headers.iter().map(|(n, v)| (n.as_str(), v.as_str())));
        self.redactor.redact_pairs(headers)
    }

    pub fn log_request(&self, request: &RequestDescriptor, bearer: Option<&str>, request_id: &str) {
        if !self.enabled {
            return;
        }
        let headers = self.redacted_headers(request, bearer, request_id);
        let body = request.body.as_ref().map(|body| self.redactor.redact(body));
        debug!(
            target: HTTP_LOG_TARGET,
            request_id,
            method = %request.method,
            path = %request.path,
            retried = request.is_retried(),
            headers = ?headers,
            body = %body.unwrap_or(serde_json::Value::Null),
            "API request"
        );
    }

    pub fn log_response(
        &self,
        request: &RequestDescriptor,
        request_id: &str,
        status: StatusCode,
        body: &Value,
    ) {
        if !self.enabled {
            return;
        }
        debug!(
            target: HTTP_LOG_TARGET,
            request_id,
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            body = %self.redactor.redact(body),
            "API response"
        );
    }

    pub fn log_failure(&self, request: &RequestDescriptor, request_id: &str, error: &str) {
        if !self.enabled {
            return;
        }
        debug!(
            target: HTTP_LOG_TARGET,
            request_id,
            method = %request.method,
            path = %request.path,
            error,
            "API request failed"
        );
    }
}
