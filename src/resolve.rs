use std::net::IpAddr;

use async_trait::async_trait;
use tracing::warn;

/// Forward DNS seam used to discover alternate API server addresses.
///
/// Resolution failure is reported as an empty list rather than an error:
/// a dispatch that cannot discover alternates simply stops retrying.
#[async_trait]
pub trait ResolveHost: Send + Sync {
    async fn resolve(&self, host: &str) -> Vec<IpAddr>;
}

/// System resolver backed by `tokio::net::lookup_host`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DnsResolver;

#[async_trait]
impl ResolveHost for DnsResolver {
    async fn resolve(&self, host: &str) -> Vec<IpAddr> {
        match tokio::net::lookup_host((host, 443)).await {
            Ok(addresses) => addresses.map(|address| address.ip()).collect(),
            Err(error) => {
                warn!(host = %host, error = %error, "dns lookup failed");
                Vec::new()
            }
        }
    }
}
