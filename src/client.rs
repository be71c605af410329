use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use crate::classify::{classify, AttemptOutcome};
use crate::pool::ServerPool;
use crate::resolve::{DnsResolver, ResolveHost};
use crate::service::BuildsRequest;
use crate::transport::{HttpTransport, Transport, TransportCall};
use crate::types::{AttemptRecord, DispatchResult, RequestSnapshot, ResponseSnapshot};
use crate::{ClientOptions, Region, Result, Smtp2goError};

/// Global API base URL, used when no region is selected.
pub const API_URL: &str = "https://api.smtp2go.com/v3/";
/// Canonical API hostname behind [`API_URL`].
pub const API_HOST: &str = "api.smtp2go.com";

/// Where a dispatch stands after classifying the latest attempt.
enum DispatchState {
    Attempting,
    Succeeded,
    Rejected,
    Exhausted,
    Fatal(String),
}

/// Client for the SMTP2GO HTTPS API.
///
/// [`send`](Self::send) delivers any [`BuildsRequest`] payload. When the
/// retry budget allows, network-layer failures are retried against
/// alternate server addresses discovered through DNS, each retry pinned to
/// an address not yet tried.
///
/// # Example
///
/// ```no_run
/// use smtp2go_http::mail::{Address, MailSend};
/// use smtp2go_http::Smtp2goClient;
///
/// # async fn demo() -> smtp2go_http::Result<()> {
/// let mut client = Smtp2goClient::new("api-YOURKEY");
/// client.set_max_attempts(3)?;
///
/// let mail = MailSend::new(
///     Address::with_name("no-reply@example.com", "Example App"),
///     [Address::new("kit@example.com")],
///     "Welcome",
///     "<h1>Hello</h1>",
/// );
///
/// let outcome = client.send(&mail).await?;
/// assert!(outcome.succeeded);
/// # Ok(())
/// # }
/// ```
pub struct Smtp2goClient {
    api_key: String,
    options: ClientOptions,
    transport: Box<dyn Transport>,
    resolver: Box<dyn ResolveHost>,
    pool: ServerPool,
    last_request: Option<RequestSnapshot>,
    last_response: Option<ResponseSnapshot>,
    failed_attempts: u32,
    attempt_log: Vec<AttemptRecord>,
}

impl fmt::Debug for Smtp2goClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Smtp2goClient")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url())
            .field("options", &self.options)
            .field("failed_attempts", &self.failed_attempts)
            .finish()
    }
}

impl Smtp2goClient {
    /// Creates a client with default options, the `reqwest` transport and
    /// the system DNS resolver.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            options: ClientOptions::default(),
            transport: Box::new(HttpTransport::new()),
            resolver: Box::new(DnsResolver),
            pool: ServerPool::new(),
            last_request: None,
            last_response: None,
            failed_attempts: 0,
            attempt_log: Vec::new(),
        }
    }

    /// Creates a client from the `SMTP2GO_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("SMTP2GO_API_KEY").map_err(|_| {
            Smtp2goError::Config("missing SMTP2GO_API_KEY environment variable".to_owned())
        })?;
        if api_key.trim().is_empty() {
            return Err(Smtp2goError::Config(
                "SMTP2GO_API_KEY is set but empty".to_owned(),
            ));
        }
        Ok(Self::new(api_key))
    }

    /// Applies dispatch options such as the attempt budget and timeouts.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the wire transport. Mainly for tests and custom stacks.
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Replaces the DNS resolver used for failover discovery.
    pub fn with_resolver(mut self, resolver: Box<dyn ResolveHost>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) -> &mut Self {
        self.api_key = api_key.into();
        self
    }

    /// Routes dispatches through a regional entry point. Only the labels
    /// `us`, `eu` and `au` exist; anything else is rejected and the
    /// previous endpoint stays in effect.
    pub fn set_region(&mut self, region: &str) -> Result<&mut Self> {
        let region = region.parse::<Region>()?;
        self.options.region = Some(region);
        Ok(self)
    }

    pub fn region(&self) -> Option<Region> {
        self.options.region
    }

    /// Caps the number of delivery attempts per dispatch. At least one
    /// attempt is always made, so zero is rejected.
    pub fn set_max_attempts(&mut self, max_attempts: u32) -> Result<&mut Self> {
        if max_attempts == 0 {
            return Err(Smtp2goError::Config(
                "max_attempts must be at least 1".to_owned(),
            ));
        }
        self.options.max_attempts = max_attempts;
        Ok(self)
    }

    /// Seeds the failover pool directly, bypassing DNS discovery.
    pub fn set_server_addrs(&mut self, addresses: Vec<IpAddr>) -> &mut Self {
        self.pool.seed(addresses);
        self
    }

    /// Failover addresses not yet consumed by retries.
    pub fn server_addrs(&self) -> &[IpAddr] {
        self.pool.candidates()
    }

    /// Base URL dispatches are sent to, honoring the region selection and
    /// the `base_url` override.
    pub fn api_url(&self) -> String {
        if let Some(base) = &self.options.base_url {
            let mut base = base.clone();
            if !base.ends_with('/') {
                base.push('/');
            }
            return base;
        }
        match self.options.region {
            Some(region) => format!("https://{}-api.smtp2go.com/v3/", region.prefix()),
            None => API_URL.to_owned(),
        }
    }

    pub fn last_request(&self) -> Option<&RequestSnapshot> {
        self.last_request.as_ref()
    }

    pub fn last_response(&self) -> Option<&ResponseSnapshot> {
        self.last_response.as_ref()
    }

    pub fn last_status_code(&self) -> Option<u16> {
        self.last_response.as_ref().map(|response| response.status)
    }

    /// Failed attempts counted during the most recent dispatch.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// One record per counted failure of the most recent dispatch.
    pub fn attempt_log(&self) -> &[AttemptRecord] {
        self.attempt_log.as_slice()
    }

    /// Dispatches `service` and reports the verdict.
    ///
    /// Timeouts, refused connections and 4xx/5xx replies are not `Err`;
    /// they fold into the returned [`DispatchResult`]. `Err` is reserved
    /// for configuration mistakes and failures no retry can fix.
    ///
    /// With an attempt budget above one, each network-layer failure arms a
    /// retry pinned to the next alternate server address. Alternates come
    /// from a DNS lookup of the API host, minus the address that just
    /// failed; the first attempt always rides ordinary DNS resolution. The
    /// per-attempt timeout grows by a fixed increment after every failure,
    /// and dispatch stops as soon as the budget or the alternates run out.
    pub async fn send<S>(&mut self, service: &S) -> Result<DispatchResult>
    where
        S: BuildsRequest + ?Sized,
    {
        let endpoint = service.endpoint();
        if endpoint.trim().is_empty() {
            return Err(Smtp2goError::Config(
                "endpoint path must not be empty".to_owned(),
            ));
        }
        if self.options.max_attempts == 0 {
            return Err(Smtp2goError::Config(
                "max_attempts must be at least 1".to_owned(),
            ));
        }

        let method = service.method();
        let mut body = service.build_request_body();
        body.insert("api_key".to_owned(), Value::String(self.api_key.clone()));
        let body = Value::Object(body);

        let url = format!("{}{}", self.api_url(), endpoint);
        let host = host_of(&url)?;

        self.failed_attempts = 0;
        self.attempt_log.clear();
        self.last_request = None;
        self.last_response = None;
        self.pool.clear_excluded();

        let armed = self.options.max_attempts > 1;
        let mut timeout_ms = self.options.timeout_ms;
        let mut attempts_made: u32 = 0;
        let mut discovered = false;
        let mut state = DispatchState::Attempting;

        loop {
            // The first attempt rides ordinary DNS; every retry detours
            // through the next alternate address instead.
            let pinned = if attempts_made == 0 {
                None
            } else {
                self.pool.next()
            };
            attempts_made += 1;

            debug!(attempt = attempts_made, pinned = ?pinned, url = %url, "dispatching request");

            let call = TransportCall {
                method: method.clone(),
                url: url.clone(),
                host: host.clone(),
                body: body.clone(),
                timeout: Duration::from_millis(timeout_ms),
                pinned,
            };

            match classify(self.transport.perform(&call).await) {
                AttemptOutcome::Success(response) => {
                    debug!(status = response.status, "request answered");
                    self.last_response = Some(response);
                    state = DispatchState::Succeeded;
                }
                AttemptOutcome::Rejected(response) => {
                    warn!(status = response.status, "request rejected");
                    self.last_request = Some(call.snapshot());
                    self.last_response = Some(response);
                    state = DispatchState::Rejected;
                }
                AttemptOutcome::Transient {
                    error,
                    response,
                    address,
                } => {
                    let failed_address = address.or(pinned);
                    warn!(
                        attempt = attempts_made,
                        address = ?failed_address,
                        error = %error,
                        "delivery attempt failed"
                    );
                    self.last_request = Some(call.snapshot());
                    if let Some(response) = response {
                        self.last_response = Some(response);
                    }

                    if !armed {
                        state = DispatchState::Exhausted;
                    } else {
                        self.failed_attempts += 1;
                        self.attempt_log.push(AttemptRecord {
                            address: failed_address,
                            error,
                        });
                        if let Some(failed_address) = failed_address {
                            self.pool.exclude(failed_address);
                        }
                        timeout_ms = timeout_ms.saturating_add(self.options.timeout_increment_ms);

                        // Discovery runs at most once per dispatch; a pool
                        // that drains afterwards forecloses further retries.
                        if !discovered && self.pool.is_empty() {
                            let resolved = self.resolver.resolve(&host).await;
                            debug!(
                                host = %host,
                                count = resolved.len(),
                                "discovered alternate server addresses"
                            );
                            self.pool.populate(resolved);
                            discovered = true;
                        }

                        if self.failed_attempts >= self.options.max_attempts
                            || self.pool.is_empty()
                        {
                            state = DispatchState::Exhausted;
                        }
                    }
                }
                AttemptOutcome::Fatal(message) => {
                    state = DispatchState::Fatal(message);
                }
            }

            if !matches!(state, DispatchState::Attempting) {
                break;
            }
        }

        if let DispatchState::Fatal(message) = state {
            return Err(Smtp2goError::Fatal(message));
        }

        Ok(DispatchResult {
            succeeded: self.last_status_code() == Some(200),
            last_status_code: self.last_status_code(),
            last_request: self.last_request.clone(),
            last_response: self.last_response.clone(),
            failed_attempts: self.failed_attempts,
            attempt_log: self.attempt_log.clone(),
        })
    }
}

fn host_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|error| Smtp2goError::Config(format!("invalid api url {url}: {error}")))?;
    parsed
        .host_str()
        .map(str::to_owned)
        .ok_or_else(|| Smtp2goError::Config(format!("api url {url} has no host")))
}
