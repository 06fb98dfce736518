//! Endpoint configuration and service key derivation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The protocol-level check run against an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestKind {
    Ping,
    Dns,
    Http,
}

impl TestKind {
    /// All kinds in reporting order.
    pub const ALL: [TestKind; 3] = [TestKind::Ping, TestKind::Dns, TestKind::Http];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::Ping => "PING",
            TestKind::Dns => "DNS",
            TestKind::Http => "HTTP",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored endpoint. Read-only once the monitor has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub location: String,
    #[serde(default)]
    pub region: String,
    pub provider: String,
    pub hostname: String,
    #[serde(default)]
    pub test_ping: bool,
    #[serde(default)]
    pub test_dns: bool,
    #[serde(default)]
    pub test_http: bool,
}

impl Endpoint {
    /// Whether the given kind is enabled for this endpoint.
    pub fn tests(&self, kind: TestKind) -> bool {
        match kind {
            TestKind::Ping => self.test_ping,
            TestKind::Dns => self.test_dns,
            TestKind::Http => self.test_http,
        }
    }

    /// Enabled kinds, in reporting order.
    pub fn test_kinds(&self) -> impl Iterator<Item = TestKind> + '_ {
        TestKind::ALL.into_iter().filter(move |k| self.tests(*k))
    }

    /// Human label used in logs, e.g. `Tokyo, JP [AWS]`.
    pub fn label(&self) -> String {
        format!("{} [{}]", self.location, self.provider)
    }
}

/// Identifies the history of one (endpoint, test kind) pair.
///
/// The textual form `"{location} [{provider}] - {KIND}"` is what ends up in
/// the snapshot file, so it must stay stable across releases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceKey(String);

/// Components recovered from a service key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyParts {
    pub location: String,
    pub provider: String,
    pub test_kind: String,
}

impl ServiceKey {
    pub fn new(endpoint: &Endpoint, kind: TestKind) -> Self {
        Self(format!("{} - {}", endpoint.label(), kind))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the key back into location, provider and test kind.
    pub fn parts(&self) -> KeyParts {
        parse_key(&self.0)
    }
}

impl AsRef<str> for ServiceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse any key string, including ones written by hand or by older
/// versions that had no provider or kind suffix.
pub fn parse_key(key: &str) -> KeyParts {
    let (rest, test_kind) = match key.rfind(" - ") {
        Some(idx) => (&key[..idx], key[idx + 3..].to_string()),
        None => (key, "OTHER".to_string()),
    };

    let bracketed = rest
        .find('[')
        .and_then(|start| rest[start..].find(']').map(|len| (start, start + len)));

    match bracketed {
        Some((start, end)) => KeyParts {
            location: rest[..start].trim().to_string(),
            provider: rest[start + 1..end].to_string(),
            test_kind,
        },
        None => KeyParts {
            location: rest.to_string(),
            provider: "N/A".to_string(),
            test_kind,
        },
    }
}

/// The built-in endpoint list: AWS S3 regional endpoints with every check enabled.
pub fn default_endpoints() -> Vec<Endpoint> {
    const REGIONS: &[(&str, &str)] = &[
        ("Cape Town, ZA", "af-south-1"),
        ("São Paulo, BR", "sa-east-1"),
        ("Paris, FR", "eu-west-3"),
        ("Frankfurt, DE", "eu-central-1"),
        ("London, UK", "eu-west-2"),
        ("Stockholm, SE", "eu-north-1"),
        ("Milan, IT", "eu-south-1"),
        ("Dubai, AE", "me-south-1"),
        ("Riyadh, SA", "me-central-1"),
        ("Mumbai, IN", "ap-south-1"),
        ("Hyderabad, IN", "ap-south-2"),
        ("Singapore, SG", "ap-southeast-1"),
        ("Jakarta, ID", "ap-southeast-3"),
        ("Tokyo, JP", "ap-northeast-1"),
        ("Seoul, KR", "ap-northeast-2"),
        ("Osaka, JP", "ap-northeast-3"),
        ("Sydney, AU", "ap-southeast-2"),
        ("Melbourne, AU", "ap-southeast-4"),
        ("Ashburn, VA", "us-east-1"),
        ("Columbus, OH", "us-east-2"),
        ("San Jose, CA", "us-west-1"),
        ("Portland, OR", "us-west-2"),
        ("Montreal, CA", "ca-central-1"),
    ];

    REGIONS
        .iter()
        .map(|(location, region)| Endpoint {
            location: location.to_string(),
            region: region.to_string(),
            provider: "AWS".to_string(),
            hostname: format!("s3.{}.amazonaws.com", region),
            test_ping: true,
            test_dns: true,
            test_http: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokyo() -> Endpoint {
        Endpoint {
            location: "Tokyo, JP".to_string(),
            region: "ap-northeast-1".to_string(),
            provider: "AWS".to_string(),
            hostname: "s3.ap-northeast-1.amazonaws.com".to_string(),
            test_ping: true,
            test_dns: false,
            test_http: true,
        }
    }

    #[test]
    fn test_service_key_format() {
        let key = ServiceKey::new(&tokyo(), TestKind::Ping);
        assert_eq!(key.as_str(), "Tokyo, JP [AWS] - PING");
    }

    #[test]
    fn test_service_key_is_stable() {
        let a = ServiceKey::new(&tokyo(), TestKind::Http);
        let mut other = tokyo();
        other.hostname = "elsewhere.example".to_string();
        other.region = "changed".to_string();
        let b = ServiceKey::new(&other, TestKind::Http);
        assert_eq!(a, b);
        assert_ne!(a, ServiceKey::new(&tokyo(), TestKind::Dns));
    }

    #[test]
    fn test_key_parts_roundtrip() {
        let parts = ServiceKey::new(&tokyo(), TestKind::Dns).parts();
        assert_eq!(parts.location, "Tokyo, JP");
        assert_eq!(parts.provider, "AWS");
        assert_eq!(parts.test_kind, "DNS");
    }

    #[test]
    fn test_parse_key_without_suffix() {
        let parts = parse_key("Home Router");
        assert_eq!(parts.location, "Home Router");
        assert_eq!(parts.provider, "N/A");
        assert_eq!(parts.test_kind, "OTHER");

        let parts = parse_key("GitHub - HTTP");
        assert_eq!(parts.location, "GitHub");
        assert_eq!(parts.provider, "N/A");
        assert_eq!(parts.test_kind, "HTTP");
    }

    #[test]
    fn test_enabled_kinds() {
        let kinds: Vec<_> = tokyo().test_kinds().collect();
        assert_eq!(kinds, vec![TestKind::Ping, TestKind::Http]);

        let mut none = tokyo();
        none.test_ping = false;
        none.test_http = false;
        assert_eq!(none.test_kinds().count(), 0);
    }

    #[test]
    fn test_endpoint_json_defaults() {
        let ep: Endpoint = serde_json::from_str(
            r#"{"location":"Lab","provider":"Home","hostname":"192.168.1.1","test_ping":true}"#,
        )
        .unwrap();
        assert!(ep.test_ping);
        assert!(!ep.test_dns);
        assert!(!ep.test_http);
        assert!(ep.region.is_empty());
    }

    #[test]
    fn test_default_endpoints() {
        let endpoints = default_endpoints();
        assert_eq!(endpoints.len(), 23);
        assert!(endpoints.iter().all(|e| e.test_kinds().count() == 3));
        assert_eq!(endpoints[0].hostname, "s3.af-south-1.amazonaws.com");
    }
}
