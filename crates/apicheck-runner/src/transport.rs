//! HTTP transport seam
//!
//! The orchestrator only sees [`Transport`]. Live runs use
//! [`ReqwestTransport`]; offline runs and tests use
//! [`crate::simulate::SimulatedTransport`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use apicheck_core::{Config, Method, RequestBody, ResponseCapture};
use serde_json::Value;
use tracing::debug;

/// A fully resolved request, ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
}

/// Sends one request and captures the response.
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Returns error if no response was received (timeout, connection
    /// failure, invalid request).
    fn send(&self, request: &PreparedRequest) -> Result<ResponseCapture, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &PreparedRequest) -> Result<ResponseCapture, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &PreparedRequest) -> Result<ResponseCapture, TransportError> {
        (**self).send(request)
    }
}

/// Blocking reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        Self::new(Duration::from_secs(config.timeout_secs), &config.user_agent)
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &PreparedRequest) -> Result<ResponseCapture, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let mut req = self.client.request(method, &request.url);
        for (k, v) in &request.headers {
            // Values that are not valid HTTP never reach the server.
            if reqwest::header::HeaderValue::from_str(v).is_ok() {
                req = req.header(k, v);
            } else {
                debug!(header = %k, "skipping invalid header value");
            }
        }
        match &request.body {
            Some(RequestBody::Json(value)) => req = req.json(value),
            Some(RequestBody::Text(text)) => req = req.body(text.clone()),
            None => {}
        }

        let start = Instant::now();
        let resp = req.send().map_err(TransportError::from_reqwest)?;

        let status_code = resp.status().as_u16();
        let headers: BTreeMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let text = resp.text().map_err(|e| TransportError::Body(e.to_string()))?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let content_type = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.as_str());
        let body = parse_body(content_type, &text);

        Ok(ResponseCapture {
            status_code,
            headers,
            body,
            elapsed_ms,
        })
    }
}

/// Parse a response body: JSON when the content type says so (or is absent
/// and the text parses), otherwise the raw text. Empty bodies are `null`.
#[must_use]
pub fn parse_body(content_type: Option<&str>, text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    let try_json = content_type.is_none_or(|ct| ct.to_ascii_lowercase().contains("json"));
    if try_json {
        if let Ok(value) = serde_json::from_str(text) {
            return value;
        }
    }
    Value::String(text.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("cannot read response body: {0}")]
    Body(String),
    #[error("HTTP error: {0}")]
    Other(String),
}

impl TransportError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_builder() || err.is_request() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}
