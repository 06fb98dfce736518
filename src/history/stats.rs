//! Summary statistics over stored history.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::models::{Measurement, Snapshot};
use crate::endpoint::parse_key;

/// Trend percentage beyond which a service is flagged slow or fast.
const STATUS_THRESHOLD: f64 = 50.0;

/// Per-key summary of the stored window.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSummary {
    pub name: String,
    pub location: String,
    pub provider: String,
    pub test_type: String,
    pub count: usize,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub std_dev_ms: f64,
    pub first_ms: f64,
    pub latest_ms: f64,
    /// Change from the oldest to the newest stored sample, in percent.
    pub trend_percent: f64,
    pub status: &'static str,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Extremes across all summarized services.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetOverview {
    pub total_endpoints: usize,
    pub fastest: Option<String>,
    pub slowest: Option<String>,
    pub most_improved: Option<String>,
    pub most_degraded: Option<String>,
}

fn millis(m: &Measurement) -> f64 {
    m.response_time.as_nanos() as f64 / 1_000_000.0
}

/// Summarize one key. Returns `None` when there are no samples.
pub fn summarize(name: &str, points: &[Measurement]) -> Option<ServiceSummary> {
    let first = points.first()?;
    let last = points.last()?;

    let values: Vec<f64> = points.iter().map(millis).collect();
    let count = values.len();
    let avg = values.iter().sum::<f64>() / count as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / count as f64;

    let first_ms = millis(first);
    let latest_ms = millis(last);
    let trend_percent = if first_ms > 0.0 {
        (latest_ms - first_ms) / first_ms * 100.0
    } else {
        0.0
    };

    let status = if trend_percent > STATUS_THRESHOLD {
        "slow"
    } else if trend_percent < -STATUS_THRESHOLD {
        "fast"
    } else {
        "steady"
    };

    let parts = parse_key(name);
    Some(ServiceSummary {
        name: name.to_string(),
        location: parts.location,
        provider: parts.provider,
        test_type: parts.test_kind,
        count,
        min_ms: min,
        avg_ms: avg,
        max_ms: max,
        std_dev_ms: variance.sqrt(),
        first_ms,
        latest_ms,
        trend_percent,
        status,
        first_seen: first.timestamp,
        last_seen: last.timestamp,
    })
}

/// Summaries for every non-empty key, sorted by location then test type.
pub fn summarize_all(snapshot: &Snapshot) -> Vec<ServiceSummary> {
    let mut summaries: Vec<_> = snapshot
        .iter()
        .filter_map(|(name, points)| summarize(name, points))
        .collect();

    summaries.sort_by(|a, b| {
        a.location
            .cmp(&b.location)
            .then_with(|| a.test_type.cmp(&b.test_type))
    });
    summaries
}

/// Pick out the fastest, slowest, most improved and most degraded services.
pub fn overview(summaries: &[ServiceSummary]) -> FleetOverview {
    let by = |f: fn(&ServiceSummary) -> f64, want_max: bool| {
        summaries
            .iter()
            .max_by(|a, b| {
                let ord = f(a).total_cmp(&f(b));
                if want_max {
                    ord
                } else {
                    ord.reverse()
                }
            })
            .map(|s| s.name.clone())
    };

    FleetOverview {
        total_endpoints: summaries.len(),
        fastest: by(|s| s.avg_ms, false),
        slowest: by(|s| s.avg_ms, true),
        most_improved: by(|s| s.trend_percent, false),
        most_degraded: by(|s| s.trend_percent, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn series(values_ms: &[u64]) -> Vec<Measurement> {
        values_ms
            .iter()
            .enumerate()
            .map(|(i, v)| {
                Measurement::new(
                    Utc.timestamp_opt(1_700_000_000 + i as i64 * 30, 0).unwrap(),
                    Duration::from_millis(*v),
                )
            })
            .collect()
    }

    #[test]
    fn test_summarize() {
        let s = summarize("Tokyo, JP [AWS] - PING", &series(&[100, 200, 300])).unwrap();
        assert_eq!(s.location, "Tokyo, JP");
        assert_eq!(s.provider, "AWS");
        assert_eq!(s.test_type, "PING");
        assert_eq!(s.count, 3);
        assert!((s.min_ms - 100.0).abs() < 1e-9);
        assert!((s.avg_ms - 200.0).abs() < 1e-9);
        assert!((s.max_ms - 300.0).abs() < 1e-9);
        assert!((s.std_dev_ms - 81.649_658).abs() < 1e-3);
        assert!((s.trend_percent - 200.0).abs() < 1e-9);
        assert_eq!(s.status, "slow");
        assert!(s.first_seen < s.last_seen);
    }

    #[test]
    fn test_summarize_empty_and_zero_first() {
        assert!(summarize("k", &[]).is_none());

        let s = summarize("k", &series(&[0, 50])).unwrap();
        assert_eq!(s.trend_percent, 0.0);
        assert_eq!(s.status, "steady");
    }

    #[test]
    fn test_summarize_all_sorted_and_overview() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("Tokyo, JP [AWS] - PING".into(), series(&[100, 40]));
        snapshot.insert("Paris, FR [AWS] - HTTP".into(), series(&[50, 50]));
        snapshot.insert("Paris, FR [AWS] - DNS".into(), series(&[10, 30]));
        snapshot.insert("Empty [AWS] - DNS".into(), Vec::new());

        let all = summarize_all(&snapshot);
        let names: Vec<_> = all.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Paris, FR [AWS] - DNS",
                "Paris, FR [AWS] - HTTP",
                "Tokyo, JP [AWS] - PING"
            ]
        );
        assert_eq!(all[2].status, "fast");

        let o = overview(&all);
        assert_eq!(o.total_endpoints, 3);
        assert_eq!(o.fastest.as_deref(), Some("Paris, FR [AWS] - DNS"));
        assert_eq!(o.slowest.as_deref(), Some("Tokyo, JP [AWS] - PING"));
        assert_eq!(o.most_improved.as_deref(), Some("Tokyo, JP [AWS] - PING"));
        assert_eq!(o.most_degraded.as_deref(), Some("Paris, FR [AWS] - DNS"));
    }

    #[test]
    fn test_overview_empty() {
        let o = overview(&[]);
        assert_eq!(o.total_endpoints, 0);
        assert!(o.fastest.is_none() && o.most_degraded.is_none());
    }
}
