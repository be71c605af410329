use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HOST;
use reqwest::{Certificate, Method, Url};
use serde_json::Value;

use crate::error::Smtp2goError;
use crate::types::{RequestSnapshot, ResponseSnapshot};

/// One outbound call, fully resolved by the dispatcher.
#[derive(Clone, Debug)]
pub struct TransportCall {
    pub method: Method,
    pub url: String,
    /// Canonical API host, sent as the `Host` header on every attempt so
    /// virtual hosting keeps working when the connection is pinned.
    pub host: String,
    pub body: Value,
    pub timeout: Duration,
    /// Address the URL host must resolve to, for this call only. `None`
    /// leaves resolution to ordinary DNS.
    pub pinned: Option<IpAddr>,
}

impl TransportCall {
    pub(crate) fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            method: self.method.clone(),
            url: self.url.clone(),
            body: self.body.clone(),
            pinned: self.pinned,
        }
    }
}

/// Raised by [`Transport`] implementations when no reply was obtained.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Network-layer failure with no authoritative answer: refused or reset
    /// connections, timeouts, TLS and DNS trouble.
    #[error("connectivity error: {message}")]
    Connectivity {
        message: String,
        /// Peer involved, when the transport can tell.
        address: Option<IpAddr>,
    },
    /// Everything else. The dispatcher gives up on these.
    #[error("transport error: {message}")]
    Other { message: String },
}

/// Seam between the dispatcher and the wire. An HTTP reply of any status is
/// `Ok`; `Err` means the exchange itself broke down.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform(&self, call: &TransportCall) -> Result<ResponseSnapshot, TransportError>;
}

/// Default [`Transport`] backed by `reqwest` with rustls.
///
/// Pinned calls are served by a throwaway client whose resolver maps the URL
/// host to the pinned address, so the TLS handshake still validates against
/// the real hostname.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
    ca_certificates: Vec<Certificate>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a transport trusting the PEM roots in `path` in addition to
    /// the system store. Bad or certificate-free bundles surface here as
    /// configuration errors, not at dispatch time.
    pub fn with_ca_bundle(path: impl AsRef<Path>) -> Result<Self, Smtp2goError> {
        let path = path.as_ref();
        let pem = fs::read(path).map_err(|error| {
            Smtp2goError::Config(format!("cannot read ca bundle {}: {error}", path.display()))
        })?;
        // from_pem on the rustls backend defers parsing to connect time and
        // skips unparseable input, so the bundle is split eagerly instead.
        let certificates = Certificate::from_pem_bundle(&pem).map_err(|error| {
            Smtp2goError::Config(format!("invalid ca bundle {}: {error}", path.display()))
        })?;
        if certificates.is_empty() {
            return Err(Smtp2goError::Config(format!(
                "ca bundle {} contains no certificates",
                path.display()
            )));
        }
        let mut builder = reqwest::Client::builder();
        for certificate in &certificates {
            builder = builder.add_root_certificate(certificate.clone());
        }
        let client = builder.build().map_err(|error| {
            Smtp2goError::Config(format!("cannot build http client: {error}"))
        })?;
        Ok(Self {
            client,
            ca_certificates: certificates,
        })
    }

    fn pinned_client(
        &self,
        domain: &str,
        address: SocketAddr,
    ) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder().resolve(domain, address);
        for certificate in &self.ca_certificates {
            builder = builder.add_root_certificate(certificate.clone());
        }
        builder.build().map_err(|error| TransportError::Other {
            message: format!("cannot build pinned client: {error}"),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform(&self, call: &TransportCall) -> Result<ResponseSnapshot, TransportError> {
        let url = Url::parse(&call.url).map_err(|error| TransportError::Other {
            message: format!("invalid url {}: {error}", call.url),
        })?;

        let client = match call.pinned {
            Some(address) => {
                let domain = url.host_str().ok_or_else(|| TransportError::Other {
                    message: format!("url {} has no host", call.url),
                })?;
                let port = url.port_or_known_default().unwrap_or(443);
                self.pinned_client(domain, SocketAddr::new(address, port))?
            }
            None => self.client.clone(),
        };

        let sent = client
            .request(call.method.clone(), url)
            .header(HOST, call.host.as_str())
            .timeout(call.timeout)
            .json(&call.body)
            .send()
            .await;

        match sent {
            Ok(response) => {
                let status = response.status().as_u16();
                let headers = response.headers().clone();
                let remote_addr = response.remote_addr().map(|peer| peer.ip()).or(call.pinned);
                let body = response
                    .text()
                    .await
                    .map_err(|error| sort_reqwest_error(error, call.pinned))?;
                Ok(ResponseSnapshot {
                    status,
                    headers,
                    body,
                    remote_addr,
                })
            }
            Err(error) => Err(sort_reqwest_error(error, call.pinned)),
        }
    }
}

/// Failures `reqwest` attributes to the wire become `Connectivity`; builder
/// misuse, redirect policy and decode failures become `Other`.
fn sort_reqwest_error(error: reqwest::Error, pinned: Option<IpAddr>) -> TransportError {
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        TransportError::Connectivity {
            message: error.to_string(),
            address: pinned,
        }
    } else {
        TransportError::Other {
            message: error.to_string(),
        }
    }
}
