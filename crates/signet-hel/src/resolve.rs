// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hostname resolution behind a narrow seam so policy tests never touch
//! real DNS.

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

use async_trait::async_trait;

/// Resolves a hostname to candidate addresses (both families).
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Resolve `host` for a connection to `port`.
    ///
    /// # Errors
    ///
    /// An [`io::Error`] when resolution fails outright.
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// System resolver backed by `tokio::net::lookup_host`.
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|sa| sa.ip()).collect())
    }
}

/// Fixed-table resolver for tests and air-gapped runs.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    table: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    /// Creates an empty resolver; every lookup fails until hosts are added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register addresses for a host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, ips: Vec<IpAddr>) -> Self {
        self.table.insert(host.into(), ips);
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        self.table.get(host).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no addresses for {host}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_returns_registered_addresses() {
        let resolver = StaticResolver::new()
            .with_host("api.partner.com", vec!["203.0.113.9".parse().unwrap()]);
        let ips = resolver.resolve("api.partner.com", 443).await.unwrap();
        assert_eq!(ips, vec!["203.0.113.9".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn static_resolver_misses_unknown_hosts() {
        let resolver = StaticResolver::new();
        assert!(resolver.resolve("nowhere.example", 443).await.is_err());
    }

    #[tokio::test]
    async fn system_resolver_handles_ip_literals() {
        let resolver = SystemResolver;
        let ips = resolver.resolve("127.0.0.1", 443).await.unwrap();
        assert_eq!(ips, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }
}
