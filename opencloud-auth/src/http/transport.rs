//! Transport trait and the request/response shapes it exchanges.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::error::Error;

/// A single request against the Open Cloud API, relative to the transport's base URL.
#[derive(Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// Form-encoded body fields.
    pub form: Option<Vec<(String, String)>>,
}

impl ApiRequest {
    /// Create a request with the given method and path.
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            form: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    /// Add a request header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a query parameter.
    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a form field, switching the body to form encoding.
    pub fn with_form_field(mut self, name: &str, value: &str) -> Self {
        self.form
            .get_or_insert_with(Vec::new)
            .push((name.to_string(), value.to_string()));
        self
    }

    /// Look up a form field by name.
    pub fn form_field(&self, name: &str) -> Option<&str> {
        self.form
            .as_ref()?
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

// Header and form values carry credentials, so only their names are printed.
impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |pairs: &[(String, String)]| {
            pairs.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>()
        };
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &names(&self.headers))
            .field("query", &self.query)
            .field("form", &self.form.as_deref().map(names))
            .finish()
    }
}

/// Response from the Open Cloud API.
///
/// Non-success statuses are returned here rather than as errors; callers
/// translate them with their own error policy.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body, or `Value::Null` when the body is empty or not JSON.
    pub body: Value,
    /// Response headers with lowercase names.
    pub headers: HashMap<String, String>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Read a string field from the JSON body.
    pub fn body_str(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }
}

/// A single synchronous-style HTTP exchange with the Open Cloud API.
///
/// Implementations only fail for transport problems (connection, TLS, timeout);
/// every HTTP status is reported through [`ApiResponse`]. No retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_request(&self, request: ApiRequest) -> Result<ApiResponse, Error>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send_request(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        (**self).send_request(request).await
    }
}
