//! Canned-response transport for offline runs
//!
//! Routes are matched on method plus exact URL first, then on the normalized
//! URL shape (`/users/42` matches a route for `/users/:id`). A request with
//! no matching route fails like an unreachable host.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use apicheck_core::{normalize_url, Method, ResponseCapture};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::transport::{PreparedRequest, Transport, TransportError};

/// One canned response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedRoute {
    pub method: Method,
    pub url: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Value,
    /// Reported response time
    #[serde(default)]
    pub elapsed_ms: f64,
    /// Real time to block before answering
    #[serde(default)]
    pub delay_ms: u64,
}

fn default_status() -> u16 {
    200
}

impl SimulatedRoute {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>, status: u16) -> Self {
        Self {
            method,
            url: url.into(),
            status,
            headers: BTreeMap::new(),
            body: Value::Null,
            elapsed_ms: 0.0,
            delay_ms: 0,
        }
    }

    /// Set a JSON body and a matching content type.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.headers
            .entry("Content-Type".to_string())
            .or_insert_with(|| "application/json".to_string());
        self.body = body;
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_elapsed_ms(mut self, elapsed_ms: f64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    fn capture(&self) -> ResponseCapture {
        ResponseCapture {
            status_code: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            elapsed_ms: self.elapsed_ms,
        }
    }
}

/// Transport that answers from a fixed route table and records every request
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    routes: Vec<SimulatedRoute>,
    received: Mutex<Vec<PreparedRequest>>,
}

impl SimulatedTransport {
    #[must_use]
    pub fn new(routes: Vec<SimulatedRoute>) -> Self {
        Self {
            routes,
            received: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_route(mut self, route: SimulatedRoute) -> Self {
        self.routes.push(route);
        self
    }

    /// Load a route table (a list of routes) from JSON or YAML.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, SimulationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SimulationError::Io(path.to_path_buf(), e.to_string()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let routes: Vec<SimulatedRoute> = match ext.as_str() {
            "yaml" | "yml" => serde_yml::from_str(&content)
                .map_err(|e| SimulationError::Parse(format!("Invalid YAML: {e}")))?,
            "json" => serde_json::from_str(&content)
                .map_err(|e| SimulationError::Parse(format!("Invalid JSON: {e}")))?,
            _ => {
                if content.trim_start().starts_with('[') {
                    serde_json::from_str(&content)
                        .map_err(|e| SimulationError::Parse(format!("Invalid JSON: {e}")))?
                } else {
                    serde_yml::from_str(&content)
                        .map_err(|e| SimulationError::Parse(format!("Invalid YAML: {e}")))?
                }
            }
        };
        Ok(Self::new(routes))
    }

    /// Requests received so far, in arrival order.
    #[must_use]
    pub fn received(&self) -> Vec<PreparedRequest> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn find(&self, method: Method, url: &str) -> Option<&SimulatedRoute> {
        self.routes
            .iter()
            .find(|r| r.method == method && r.url == url)
            .or_else(|| {
                let shape = normalize_url(url);
                self.routes
                    .iter()
                    .find(|r| r.method == method && normalize_url(&r.url) == shape)
            })
    }
}

impl Transport for SimulatedTransport {
    fn send(&self, request: &PreparedRequest) -> Result<ResponseCapture, TransportError> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let route = self.find(request.method, &request.url).ok_or_else(|| {
            TransportError::Connect(format!("no simulated route for {} {}", request.method, request.url))
        })?;
        debug!(method = %request.method, url = %request.url, route = %route.url, "simulated response");
        if route.delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(route.delay_ms));
        }
        Ok(route.capture())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(method: Method, url: &str) -> PreparedRequest {
        PreparedRequest {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    #[test]
    fn exact_route_wins_over_shape() {
        let transport = SimulatedTransport::default()
            .with_route(SimulatedRoute::new(Method::Get, "/users/:id", 200).with_body(json!({"id": 0})))
            .with_route(SimulatedRoute::new(Method::Get, "/users/7", 200).with_body(json!({"id": 7})));

        let exact = transport.send(&request(Method::Get, "/users/7")).unwrap();
        assert_eq!(exact.body, json!({"id": 7}));
        let shaped = transport.send(&request(Method::Get, "/users/8")).unwrap();
        assert_eq!(shaped.body, json!({"id": 0}));
        assert_eq!(shaped.header("content-type"), Some("application/json"));
    }

    #[test]
    fn unmatched_is_connect_error() {
        let transport = SimulatedTransport::default()
            .with_route(SimulatedRoute::new(Method::Get, "/users", 200));
        let err = transport.send(&request(Method::Post, "/users")).unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
        assert_eq!(transport.received().len(), 1);
    }

    #[test]
    fn load_yaml_routes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.yaml");
        std::fs::write(
            &path,
            r#"
- method: POST
  url: http://localhost:3000/users
  status: 201
  headers:
    Content-Type: application/json
  body:
    id: 42
  elapsed_ms: 35
- method: GET
  url: http://localhost:3000/health
"#,
        )
        .unwrap();

        let transport = SimulatedTransport::load(&path).unwrap();
        let created = transport
            .send(&request(Method::Post, "http://localhost:3000/users"))
            .unwrap();
        assert_eq!(created.status_code, 201);
        assert_eq!(created.elapsed_ms, 35.0);
        let health = transport
            .send(&request(Method::Get, "http://localhost:3000/health"))
            .unwrap();
        assert_eq!(health.status_code, 200);
        assert_eq!(health.body, Value::Null);
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            SimulatedTransport::load(&path),
            Err(SimulationError::Parse(_))
        ));
    }

    proptest::proptest! {
        #[test]
        fn any_numeric_id_reaches_id_route(id in 0u64..10_000_000) {
            let transport = SimulatedTransport::default()
                .with_route(SimulatedRoute::new(Method::Delete, "http://api.test/items/:id", 204));
            let url = format!("http://api.test/items/{id}?force=true");
            let response = transport.send(&request(Method::Delete, &url)).unwrap();
            proptest::prop_assert_eq!(response.status_code, 204);
        }
    }
}
