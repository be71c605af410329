use std::net::IpAddr;

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;

/// The request most recently put on the wire, kept for post-mortem
/// inspection after a failed or rejected dispatch.
#[derive(Clone, Debug)]
pub struct RequestSnapshot {
    pub method: Method,
    pub url: String,
    /// Full JSON body, credential field included.
    pub body: Value,
    /// Address the API host was pinned to, if the attempt bypassed DNS.
    pub pinned: Option<IpAddr>,
}

/// An answer received from the API, whatever its status.
#[derive(Clone, Debug)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: HeaderMap,
    /// Raw body text; the API replies in JSON.
    pub body: String,
    /// Peer address the reply actually came from, when known.
    pub remote_addr: Option<IpAddr>,
}

impl ResponseSnapshot {
    /// Parses the body as JSON. `None` when the body is not valid JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// Returns a header value as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// One failed delivery attempt: where it went and what went wrong.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttemptRecord {
    /// Server address involved, when the transport could tell.
    pub address: Option<IpAddr>,
    pub error: String,
}

/// Final verdict of one dispatch, including everything observed on the way.
#[derive(Clone, Debug, Default)]
pub struct DispatchResult {
    /// True only for an HTTP 200 reply.
    pub succeeded: bool,
    pub last_status_code: Option<u16>,
    pub last_request: Option<RequestSnapshot>,
    pub last_response: Option<ResponseSnapshot>,
    /// Failed attempts counted while failover was armed.
    pub failed_attempts: u32,
    /// One record per counted failure, in attempt order.
    pub attempt_log: Vec<AttemptRecord>,
}
