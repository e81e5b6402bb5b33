//! DNS resolution for domain destinations

use crate::{Error, Result};
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use tracing::debug;

/// Resolver backed by the system configuration, shared by all sessions of
/// one agent.
pub struct Resolver {
    inner: TokioAsyncResolver,
}

impl Resolver {
    pub fn new() -> Result<Self> {
        let inner = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| Error::dns(format!("Failed to create system resolver: {}", e)))?;
        Ok(Resolver { inner })
    }

    /// Resolve a host name to one IP address, first answer wins. IP
    /// literals short-circuit without a lookup.
    pub async fn resolve(&self, host: &str) -> Result<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let response = self
            .inner
            .lookup_ip(host)
            .await
            .map_err(|e| Error::dns(format!("{}: {}", host, e)))?;

        let ip = response
            .iter()
            .next()
            .ok_or_else(|| Error::dns(format!("{}: no addresses returned", host)))?;
        debug!("resolved {} -> {}", host, ip);
        Ok(ip)
    }
}
