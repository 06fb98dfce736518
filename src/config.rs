//! Configuration module for cloudpulse.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::endpoint::{default_endpoints, Endpoint};
use crate::probe::ProbeSettings;

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read endpoints file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid endpoints file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Monitor configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// HTTP port for the API server, 0 disables it (default: 8080)
    pub http_port: u16,
    /// Snapshot file for latency history (default: "latency_history.json")
    pub history_path: PathBuf,
    /// Time between the start of two cycles (default: 30s)
    pub interval: Duration,
    /// DNS and HTTP probe timeout (default: 10s)
    pub probe_timeout: Duration,
    /// Per-echo ping timeout (default: 5s)
    pub ping_timeout: Duration,
    /// Maximum random delay before each probe (default: 100ms)
    pub jitter: Duration,
    /// JSON file with the endpoint list; built-in list when unset
    pub endpoints_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            history_path: PathBuf::from("latency_history.json"),
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(5),
            jitter: Duration::from_millis(100),
            endpoints_path: None,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CLOUDPULSE_HTTP_PORT`: API port (default: 8080, 0 disables)
    /// - `CLOUDPULSE_HISTORY_PATH`: snapshot path (default: "latency_history.json")
    /// - `CLOUDPULSE_INTERVAL_SECS`: cycle interval (default: 30)
    /// - `CLOUDPULSE_PROBE_TIMEOUT_SECS`: DNS/HTTP timeout (default: 10)
    /// - `CLOUDPULSE_PING_TIMEOUT_SECS`: ping timeout (default: 5)
    /// - `CLOUDPULSE_JITTER_MS`: probe start jitter (default: 100)
    /// - `CLOUDPULSE_ENDPOINTS_PATH`: endpoints JSON file (default: built-in list)
    pub fn load() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    /// Values that fail to parse keep their defaults.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(port) = lookup("CLOUDPULSE_HTTP_PORT").and_then(|v| v.trim().parse().ok()) {
            cfg.http_port = port;
        }
        if let Some(path) = lookup("CLOUDPULSE_HISTORY_PATH").filter(|p| !p.is_empty()) {
            cfg.history_path = PathBuf::from(path);
        }
        if let Some(secs) = parsed("CLOUDPULSE_INTERVAL_SECS").filter(|s| *s > 0) {
            cfg.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed("CLOUDPULSE_PROBE_TIMEOUT_SECS").filter(|s| *s > 0) {
            cfg.probe_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed("CLOUDPULSE_PING_TIMEOUT_SECS").filter(|s| *s > 0) {
            cfg.ping_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parsed("CLOUDPULSE_JITTER_MS") {
            cfg.jitter = Duration::from_millis(ms);
        }
        if let Some(path) = lookup("CLOUDPULSE_ENDPOINTS_PATH").filter(|p| !p.is_empty()) {
            cfg.endpoints_path = Some(PathBuf::from(path));
        }

        cfg
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            timeout: self.probe_timeout,
            ping_timeout: self.ping_timeout,
            jitter: self.jitter,
        }
    }

    /// The endpoints to monitor: the configured file, or the built-in list.
    pub fn load_endpoints(&self) -> Result<Vec<Endpoint>, ConfigError> {
        let path = match &self.endpoints_path {
            Some(p) => p,
            None => return Ok(default_endpoints()),
        };

        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.history_path, PathBuf::from("latency_history.json"));
        assert_eq!(cfg.interval, Duration::from_secs(30));
        assert!(cfg.endpoints_path.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let cfg = MonitorConfig::from_lookup(lookup(&[
            ("CLOUDPULSE_HTTP_PORT", "0"),
            ("CLOUDPULSE_HISTORY_PATH", "/var/lib/cloudpulse/h.json"),
            ("CLOUDPULSE_INTERVAL_SECS", "60"),
            ("CLOUDPULSE_PING_TIMEOUT_SECS", "2"),
            ("CLOUDPULSE_JITTER_MS", "0"),
        ]));
        assert_eq!(cfg.http_port, 0);
        assert_eq!(cfg.history_path, PathBuf::from("/var/lib/cloudpulse/h.json"));
        assert_eq!(cfg.interval, Duration::from_secs(60));
        assert_eq!(cfg.ping_timeout, Duration::from_secs(2));
        assert_eq!(cfg.jitter, Duration::ZERO);
        assert_eq!(cfg.probe_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_malformed_values_keep_defaults() {
        let cfg = MonitorConfig::from_lookup(lookup(&[
            ("CLOUDPULSE_HTTP_PORT", "eighty"),
            ("CLOUDPULSE_INTERVAL_SECS", "0"),
            ("CLOUDPULSE_PROBE_TIMEOUT_SECS", "-3"),
        ]));
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.interval, Duration::from_secs(30));
        assert_eq!(cfg.probe_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_load_endpoints() {
        assert_eq!(MonitorConfig::default().load_endpoints().unwrap().len(), 23);

        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"[{"location":"Home","provider":"LAN","hostname":"192.168.1.1","test_ping":true}]"#,
        )
        .unwrap();
        let cfg = MonitorConfig {
            endpoints_path: Some(tmp.path().to_path_buf()),
            ..Default::default()
        };
        let endpoints = cfg.load_endpoints().unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].provider, "LAN");

        std::fs::write(tmp.path(), "not json").unwrap();
        assert!(matches!(cfg.load_endpoints(), Err(ConfigError::Parse { .. })));
    }
}
