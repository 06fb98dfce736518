//! DNS resolution probe using the system resolver.

use std::net::IpAddr;
use std::time::{Duration, Instant};
use super::ProbeError;

/// Resolve `hostname` and return the first address with the lookup time.
pub async fn resolve_host(hostname: &str, timeout: Duration) -> Result<(IpAddr, Duration), ProbeError> {
    let start = Instant::now();

    let lookup = tokio::net::lookup_host((hostname, 0));
    let addrs = tokio::time::timeout(timeout, lookup)
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
        .map_err(|e| ProbeError::Resolution(format!("lookup {} failed: {}", hostname, e)))?;

    let elapsed = start.elapsed();

    addrs
        .map(|sa| sa.ip())
        .next()
        .map(|ip| (ip, elapsed))
        .ok_or_else(|| ProbeError::Resolution(format!("no addresses found for {}", hostname)))
}
