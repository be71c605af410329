use std::{
    collections::VecDeque,
    net::{IpAddr, Ipv4Addr},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use smtp2go_http::{
    ClientOptions, ResolveHost, ResponseSnapshot, Service, Smtp2goClient, Smtp2goError, Transport,
    TransportCall, TransportError,
};

/// One scripted transport outcome, consumed per attempt in order.
#[derive(Clone)]
enum Script {
    Reply { status: u16, remote: Option<IpAddr> },
    ConnectFail(&'static str),
    Fatal(&'static str),
}

#[derive(Default)]
struct ScriptInner {
    script: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<TransportCall>>,
}

#[derive(Clone, Default)]
struct ScriptedTransport {
    inner: Arc<ScriptInner>,
}

impl ScriptedTransport {
    fn new(script: Vec<Script>) -> Self {
        Self {
            inner: Arc::new(ScriptInner {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    fn calls(&self) -> Vec<TransportCall> {
        self.inner.calls.lock().unwrap().clone()
    }

    fn pins(&self) -> Vec<Option<IpAddr>> {
        self.calls().iter().map(|call| call.pinned).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform(&self, call: &TransportCall) -> Result<ResponseSnapshot, TransportError> {
        self.inner.calls.lock().unwrap().push(call.clone());
        let step = self
            .inner
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("script must cover every attempt");
        match step {
            Script::Reply { status, remote } => Ok(ResponseSnapshot {
                status,
                headers: HeaderMap::new(),
                body: r#"{"request_id":"r-test"}"#.to_owned(),
                remote_addr: remote,
            }),
            Script::ConnectFail(message) => Err(TransportError::Connectivity {
                message: message.to_owned(),
                address: None,
            }),
            Script::Fatal(message) => Err(TransportError::Other {
                message: message.to_owned(),
            }),
        }
    }
}

struct FixedResolver(Vec<IpAddr>);

#[async_trait]
impl ResolveHost for FixedResolver {
    async fn resolve(&self, _host: &str) -> Vec<IpAddr> {
        self.0.clone()
    }
}

fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
}

fn scripted_client(
    transport: &ScriptedTransport,
    resolved: Vec<IpAddr>,
    max_attempts: u32,
) -> Smtp2goClient {
    Smtp2goClient::new("api-TESTKEY")
        .with_transport(Box::new(transport.clone()))
        .with_resolver(Box::new(FixedResolver(resolved)))
        .with_options(ClientOptions {
            max_attempts,
            timeout_ms: 1_000,
            timeout_increment_ms: 500,
            ..ClientOptions::default()
        })
}

#[tokio::test]
async fn discovery_pins_fresh_addresses_and_skips_the_failed_one() {
    let (a, b, c) = (ip(1), ip(2), ip(3));
    let transport = ScriptedTransport::new(vec![
        Script::Reply {
            status: 503,
            remote: Some(a),
        },
        Script::ConnectFail("connection refused"),
        Script::Reply {
            status: 200,
            remote: Some(b),
        },
    ]);
    let mut client = scripted_client(&transport, vec![a, b, c], 5);

    let outcome = client
        .send(&Service::new("stats/email_summary"))
        .await
        .expect("dispatch must complete");

    assert!(outcome.succeeded);
    assert_eq!(outcome.failed_attempts, 2);
    // Discovery runs after the first failure and drops the address that
    // failed; retries then pop the freshest alternates.
    assert_eq!(transport.pins(), vec![None, Some(c), Some(b)]);
    assert_eq!(outcome.attempt_log.len(), 2);
    assert_eq!(outcome.attempt_log[0].address, Some(a));
    assert_eq!(outcome.attempt_log[1].address, Some(c));
    assert!(client.server_addrs().is_empty());
}

#[tokio::test]
async fn seeded_pool_is_consumed_only_by_retries() {
    let transport = ScriptedTransport::new(vec![
        Script::Reply {
            status: 503,
            remote: None,
        },
        Script::ConnectFail("connection refused"),
        Script::ConnectFail("connection reset by peer"),
        Script::Reply {
            status: 200,
            remote: None,
        },
    ]);
    let mut client = scripted_client(&transport, Vec::new(), 10);
    client.set_server_addrs(vec![ip(1), ip(2), ip(3), ip(4)]);

    let outcome = client
        .send(&Service::new("stats/email_summary"))
        .await
        .expect("dispatch must complete");

    assert!(outcome.succeeded);
    assert_eq!(outcome.failed_attempts, 3);
    assert_eq!(outcome.attempt_log.len(), 3);
    assert_eq!(
        transport.pins(),
        vec![None, Some(ip(4)), Some(ip(3)), Some(ip(2))]
    );
    assert_eq!(client.server_addrs(), &[ip(1)]);

    // Each counted failure stretches the next attempt's timeout.
    let timeouts: Vec<Duration> = transport.calls().iter().map(|call| call.timeout).collect();
    assert_eq!(
        timeouts,
        vec![
            Duration::from_millis(1_000),
            Duration::from_millis(1_500),
            Duration::from_millis(2_000),
            Duration::from_millis(2_500),
        ]
    );
}

#[tokio::test]
async fn rejection_consumes_no_budget_and_no_pool() {
    let transport = ScriptedTransport::new(vec![Script::Reply {
        status: 400,
        remote: None,
    }]);
    let mut client = scripted_client(&transport, Vec::new(), 5);
    client.set_server_addrs(vec![ip(1)]);

    let outcome = client
        .send(&Service::new("stats/email_summary"))
        .await
        .expect("dispatch must complete");

    assert!(!outcome.succeeded);
    assert_eq!(outcome.last_status_code, Some(400));
    assert_eq!(outcome.failed_attempts, 0);
    assert!(outcome.attempt_log.is_empty());
    assert!(outcome.last_request.is_some());
    assert_eq!(transport.pins(), vec![None]);
    assert_eq!(client.server_addrs(), &[ip(1)]);
}

#[tokio::test]
async fn success_stops_the_loop_immediately() {
    let transport = ScriptedTransport::new(vec![
        Script::Reply {
            status: 503,
            remote: None,
        },
        Script::Reply {
            status: 200,
            remote: None,
        },
    ]);
    let mut client = scripted_client(&transport, vec![ip(1), ip(2)], 5);

    let outcome = client
        .send(&Service::new("stats/email_summary"))
        .await
        .expect("dispatch must complete");

    assert!(outcome.succeeded);
    assert_eq!(outcome.failed_attempts, 1);
    assert_eq!(transport.pins(), vec![None, Some(ip(2))]);
    assert_eq!(client.server_addrs(), &[ip(1)]);
}

#[tokio::test]
async fn empty_discovery_forecloses_retries() {
    let transport = ScriptedTransport::new(vec![Script::Reply {
        status: 503,
        remote: None,
    }]);
    let mut client = scripted_client(&transport, Vec::new(), 5);

    let outcome = client
        .send(&Service::new("stats/email_summary"))
        .await
        .expect("dispatch must complete");

    assert!(!outcome.succeeded);
    assert_eq!(outcome.last_status_code, Some(503));
    assert_eq!(outcome.failed_attempts, 1);
    assert_eq!(outcome.attempt_log.len(), 1);
    assert_eq!(transport.pins(), vec![None]);
    assert!(client.server_addrs().is_empty());
}

#[tokio::test]
async fn unclassified_transport_failure_is_an_error() {
    let transport = ScriptedTransport::new(vec![Script::Fatal("tls backend panicked")]);
    let mut client = scripted_client(&transport, Vec::new(), 5);
    client.set_server_addrs(vec![ip(1)]);

    let error = client
        .send(&Service::new("stats/email_summary"))
        .await
        .expect_err("unclassified failure must surface");

    assert!(matches!(error, Smtp2goError::Fatal(_)));
    assert!(error.to_string().contains("tls backend panicked"));
    assert_eq!(transport.pins(), vec![None]);
    assert_eq!(client.failed_attempts(), 0);
}

#[tokio::test]
async fn every_attempt_carries_host_key_and_url() {
    let transport = ScriptedTransport::new(vec![
        Script::Reply {
            status: 503,
            remote: None,
        },
        Script::Reply {
            status: 200,
            remote: None,
        },
    ]);
    let mut client = scripted_client(&transport, vec![ip(1)], 2);

    client
        .send(&Service::new("stats/email_summary"))
        .await
        .expect("dispatch must complete");

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    for call in &calls {
        assert_eq!(call.url, "https://api.smtp2go.com/v3/stats/email_summary");
        assert_eq!(call.host, "api.smtp2go.com");
        assert_eq!(call.method, reqwest::Method::POST);
        assert_eq!(call.body["api_key"], "api-TESTKEY");
    }
}

#[tokio::test]
async fn region_selection_shapes_the_dispatch_url() {
    let transport = ScriptedTransport::new(vec![Script::Reply {
        status: 200,
        remote: None,
    }]);
    let mut client = scripted_client(&transport, Vec::new(), 1);
    client.set_region("eu").expect("eu is a valid region");

    client
        .send(&Service::new("stats/email_summary"))
        .await
        .expect("dispatch must complete");

    let calls = transport.calls();
    assert_eq!(
        calls[0].url,
        "https://eu-api.smtp2go.com/v3/stats/email_summary"
    );
    assert_eq!(calls[0].host, "eu-api.smtp2go.com");
}

#[tokio::test]
async fn second_dispatch_starts_clean() {
    let transport = ScriptedTransport::new(vec![
        Script::Reply {
            status: 503,
            remote: None,
        },
        Script::Reply {
            status: 200,
            remote: None,
        },
        Script::Reply {
            status: 200,
            remote: None,
        },
    ]);
    let mut client = scripted_client(&transport, vec![ip(1)], 3);
    let service = Service::new("stats/email_summary");

    let first = client.send(&service).await.expect("dispatch must complete");
    assert!(first.succeeded);
    assert_eq!(first.failed_attempts, 1);

    let second = client.send(&service).await.expect("dispatch must complete");
    assert!(second.succeeded);
    assert_eq!(second.failed_attempts, 0);
    assert!(second.attempt_log.is_empty());
    assert!(second.last_request.is_none());

    // The escalated timeout does not leak into the next dispatch.
    let calls = transport.calls();
    assert_eq!(calls[1].timeout, Duration::from_millis(1_500));
    assert_eq!(calls[2].timeout, Duration::from_millis(1_000));
}
