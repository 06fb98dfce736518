//! Probe module for network monitoring.
//!
//! Supports DNS resolution, ICMP ping and HTTP HEAD probes behind a single
//! [`Prober`] interface.

mod dns;
mod http;
mod ping;

pub use dns::*;
pub use http::*;
pub use ping::*;

use crate::endpoint::{Endpoint, TestKind};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Resolution(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("command failed: {0}")]
    Command(String),
}

/// Outcome of one probe against one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub success: bool,
    /// Zero when the probe failed.
    pub elapsed: Duration,
    pub resolved_address: Option<String>,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn success(elapsed: Duration, resolved_address: Option<String>) -> Self {
        Self {
            success: true,
            elapsed,
            resolved_address,
            error: None,
        }
    }

    pub fn failure(error: impl ToString, resolved_address: Option<String>) -> Self {
        Self {
            success: false,
            elapsed: Duration::ZERO,
            resolved_address,
            error: Some(error.to_string()),
        }
    }
}

/// Performs a single check against an endpoint.
///
/// Implementations must bound their own running time.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint, kind: TestKind) -> ProbeOutcome;
}

/// Probe timeouts and start jitter.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Timeout for DNS lookups and HTTP requests.
    pub timeout: Duration,
    /// Timeout for each ICMP echo.
    pub ping_timeout: Duration,
    /// Upper bound of the random delay before a probe starts.
    pub jitter: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(5),
            jitter: Duration::from_millis(100),
        }
    }
}

impl ProbeSettings {
    /// Hard deadline for a whole probe, covering resolution plus every echo.
    fn deadline(&self) -> Duration {
        self.jitter + self.timeout * 2 + self.ping_timeout * PING_COUNT
    }
}

/// Prober backed by the system resolver, ICMP and an HTTP client.
pub struct NetworkProber {
    settings: ProbeSettings,
    http: HttpProbe,
}

impl NetworkProber {
    pub fn new(settings: ProbeSettings) -> Result<Self, ProbeError> {
        let http = HttpProbe::new(settings.timeout)?;
        Ok(Self { settings, http })
    }

    async fn run(&self, endpoint: &Endpoint, kind: TestKind) -> ProbeOutcome {
        match kind {
            TestKind::Dns => match resolve_host(&endpoint.hostname, self.settings.timeout).await {
                Ok((ip, elapsed)) => ProbeOutcome::success(elapsed, Some(ip.to_string())),
                Err(e) => ProbeOutcome::failure(e, None),
            },
            TestKind::Ping => {
                let ip = match resolve_host(&endpoint.hostname, self.settings.timeout).await {
                    Ok((ip, _)) => ip,
                    Err(e) => {
                        return ProbeOutcome::failure(format!("DNS resolution failed: {}", e), None)
                    }
                };
                match run_ping_probe(ip, self.settings.ping_timeout).await {
                    Ok(rtt) => ProbeOutcome::success(rtt, Some(ip.to_string())),
                    Err(e) => ProbeOutcome::failure(e, Some(ip.to_string())),
                }
            }
            TestKind::Http => match self.http.head(&endpoint.hostname).await {
                Ok(elapsed) => ProbeOutcome::success(elapsed, None),
                Err(e) => ProbeOutcome::failure(e, None),
            },
        }
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, endpoint: &Endpoint, kind: TestKind) -> ProbeOutcome {
        // Jitter to avoid every probe in a cycle hitting the network at once
        let jitter_ms = self.settings.jitter.as_millis() as u64;
        if jitter_ms > 0 {
            let jitter = rand::random::<u64>() % jitter_ms;
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }

        let deadline = self.settings.deadline();
        match tokio::time::timeout(deadline, self.run(endpoint, kind)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!("{} probe for {} hit the hard deadline", kind, endpoint.hostname);
                ProbeOutcome::failure(ProbeError::Timeout(deadline), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(hostname: &str) -> Endpoint {
        Endpoint {
            location: "Test".to_string(),
            region: String::new(),
            provider: "Local".to_string(),
            hostname: hostname.to_string(),
            test_ping: true,
            test_dns: true,
            test_http: true,
        }
    }

    fn quick() -> NetworkProber {
        NetworkProber::new(ProbeSettings {
            timeout: Duration::from_millis(500),
            ping_timeout: Duration::from_millis(200),
            jitter: Duration::ZERO,
        })
        .unwrap()
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = ProbeOutcome::success(Duration::from_millis(5), Some("1.2.3.4".into()));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ProbeOutcome::failure(ProbeError::Timeout(Duration::from_secs(1)), None);
        assert!(!failed.success);
        assert_eq!(failed.elapsed, Duration::ZERO);
        assert_eq!(failed.error.as_deref(), Some("probe timed out after 1s"));
    }

    #[test]
    fn test_deadline_covers_all_steps() {
        let settings = ProbeSettings::default();
        assert!(settings.deadline() > settings.timeout + settings.ping_timeout * PING_COUNT);
    }

    #[tokio::test]
    async fn test_dns_probe_literal_address() {
        let outcome = quick().probe(&endpoint("127.0.0.1"), TestKind::Dns).await;
        assert!(outcome.success);
        assert_eq!(outcome.resolved_address.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_ping_probe_unresolvable_host() {
        let outcome = quick().probe(&endpoint("host.invalid"), TestKind::Ping).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("DNS resolution failed"));
        assert!(outcome.resolved_address.is_none());
    }
}
