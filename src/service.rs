use reqwest::Method;
use serde_json::{Map, Value};

/// A request descriptor the client knows how to dispatch.
///
/// Implementations describe one API endpoint: the method, the path below
/// the versioned base URL and the JSON body. The client injects the API
/// key; implementations never handle credentials.
pub trait BuildsRequest {
    fn method(&self) -> Method;
    /// Endpoint path relative to the base URL, e.g. `stats/email_summary`.
    fn endpoint(&self) -> &str;
    fn build_request_body(&self) -> Map<String, Value>;
}

/// Ad hoc descriptor for endpoints without a dedicated builder.
#[derive(Clone, Debug)]
pub struct Service {
    endpoint: String,
    method: Method,
    body: Map<String, Value>,
}

impl Service {
    /// Creates a POST descriptor for `endpoint` with an empty body.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::POST,
            body: Map::new(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    /// Sets one body field, keeping the rest.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.body.insert(key.into(), value);
        self
    }
}

impl BuildsRequest for Service {
    fn method(&self) -> Method {
        self.method.clone()
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request_body(&self) -> Map<String, Value> {
        self.body.clone()
    }
}
