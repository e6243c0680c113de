//! Request descriptors
//!
//! A descriptor is everything needed to (re)send one logical request. The
//! transport resends the same descriptor after a session refresh, so it is
//! plain data with no reqwest state attached.

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use super::errors::ApiError;

/// One logical API request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/patients/42`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    authenticated: bool,
    retried: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            authenticated: true,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a serializable JSON body.
    ///
    /// # Errors
    /// Returns `ApiError::Serialization` when `body` cannot be encoded.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Add query parameters from a flat JSON object.
    ///
    /// `null` members are skipped; strings are sent as-is and every other
    /// value in its JSON form.
    pub fn query_object(mut self, filters: &Value) -> Self {
        if let Value::Object(map) = filters {
            for (name, value) in map {
                let value = match value {
                    Value::Null => continue,
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                self.query.push((name.clone(), value));
            }
        }
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send without a bearer credential and without 401 recovery.
    ///
    /// Used for the sign-in call itself.
    pub fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Whether this request has already been resent after a refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }
}
