//! Address resolution for the discovery tier itself.
//!
//! A resolver yields the current list of discovery server addresses. The
//! client resolves once at construction and then periodically refreshes
//! its [`ServerSet`](crate::ServerSet) from the same resolver.

use tracing::debug;

use crate::error::{DiscoveryError, DiscoveryResult};

#[tonic::async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self) -> DiscoveryResult<Vec<String>>;
}

/// A fixed address list.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    addresses: Vec<String>,
}

impl StaticResolver {
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses }
    }
}

#[tonic::async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self) -> DiscoveryResult<Vec<String>> {
        Ok(self.addresses.clone())
    }
}

/// Resolves a `host:port` name through the system resolver.
///
/// Every A/AAAA record becomes one discovery server.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    target: String,
}

impl DnsResolver {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[tonic::async_trait]
impl AddressResolver for DnsResolver {
    async fn resolve(&self) -> DiscoveryResult<Vec<String>> {
        let addrs = tokio::net::lookup_host(self.target.as_str())
            .await
            .map_err(|e| DiscoveryError::Resolve(format!("{}: {e}", self.target)))?;

        let mut out: Vec<String> = addrs.map(|a| a.to_string()).collect();
        out.sort();
        out.dedup();
        debug!(target = %self.target, resolved = out.len(), "resolved discovery servers");
        Ok(out)
    }
}
