//! HTTP probe implementation.

use std::time::{Duration, Instant};
use super::ProbeError;

/// HEAD-request probe sharing one client across all endpoints.
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        // Only reachability and latency matter here, not certificate validity
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Send `HEAD` to the address and return the time to the response headers.
    ///
    /// Bare hostnames are probed over HTTPS. Any HTTP status counts as a response.
    pub async fn head(&self, address: &str) -> Result<Duration, ProbeError> {
        let url = probe_url(address);

        let start = Instant::now();
        let response = self.client.head(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;
        let elapsed = start.elapsed();

        tracing::debug!("HEAD {} -> {} in {:?}", url, response.status(), elapsed);
        Ok(elapsed)
    }
}

fn probe_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("https://{}", address)
    }
}
