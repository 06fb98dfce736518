//! History model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Number of measurements kept per service key.
pub const WINDOW_SIZE: usize = 10;

/// A single successful measurement.
///
/// Serialized in the snapshot as `{"Timestamp": <RFC 3339>, "ResponseTime": <ns>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "ResponseTime", with = "nanos")]
    pub response_time: Duration,
}

impl Measurement {
    pub fn new(timestamp: DateTime<Utc>, response_time: Duration) -> Self {
        Self {
            timestamp,
            response_time,
        }
    }
}

/// Snapshot file contents: service key to chronological measurements.
pub type Snapshot = BTreeMap<String, Vec<Measurement>>;

/// Durations as integer nanoseconds.
mod nanos {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ns = i64::deserialize(d)?;
        if ns < 0 {
            return Err(de::Error::custom(format!("negative response time: {}ns", ns)));
        }
        Ok(Duration::from_nanos(ns as u64))
    }
}
