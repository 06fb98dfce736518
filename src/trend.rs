//! Classification of a fresh measurement against the rolling baseline.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Minimum number of samples before a baseline is trusted.
pub const MIN_SAMPLES: usize = 3;

/// Relative change, in percent, at which a measurement counts as a shift.
pub const THRESHOLD_PERCENT: i128 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    /// Not enough history to judge.
    Baseline,
    Steady,
    /// Slower than the baseline.
    Degraded,
    /// Faster than the baseline.
    Improved,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Baseline => "BASELINE",
            Trend::Steady => "STEADY",
            Trend::Degraded => "DEGRADED",
            Trend::Improved => "IMPROVED",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify `current` against `baseline`, the mean over `sample_count` samples.
///
/// A zero baseline is treated as "no baseline yet" regardless of the count.
/// Crossing the threshold exactly counts as a shift, so a measurement 50%
/// above the baseline is `Degraded`.
pub fn classify(current: Duration, baseline: Duration, sample_count: usize) -> Trend {
    if sample_count < MIN_SAMPLES || baseline.is_zero() {
        return Trend::Baseline;
    }

    // delta% = (current - baseline) / baseline * 100, compared without rounding.
    let base = baseline.as_nanos() as i128;
    let delta = current.as_nanos() as i128 - base;
    let scaled = delta * 100;
    let limit = THRESHOLD_PERCENT * base;

    if scaled >= limit {
        Trend::Degraded
    } else if scaled <= -limit {
        Trend::Improved
    } else {
        Trend::Steady
    }
}

/// Relative change of `current` against `baseline` in percent, for display.
pub fn delta_percent(current: Duration, baseline: Duration) -> Option<f64> {
    if baseline.is_zero() {
        return None;
    }
    let base = baseline.as_secs_f64();
    Some((current.as_secs_f64() - base) / base * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(classify(ms(150), ms(100), 5), Trend::Degraded);
        assert_eq!(classify(ms(149), ms(100), 5), Trend::Steady);
        assert_eq!(classify(ms(40), ms(100), 5), Trend::Improved);
        assert_eq!(classify(ms(50), ms(100), 5), Trend::Improved);
        assert_eq!(classify(ms(51), ms(100), 5), Trend::Steady);
        assert_eq!(classify(ms(100), ms(100), 10), Trend::Steady);
    }

    #[test]
    fn test_insufficient_history() {
        assert_eq!(classify(ms(100), ms(100), 2), Trend::Baseline);
        assert_eq!(classify(ms(900), ms(100), 0), Trend::Baseline);
    }

    #[test]
    fn test_zero_baseline() {
        assert_eq!(classify(ms(100), Duration::ZERO, 5), Trend::Baseline);
        assert_eq!(classify(Duration::ZERO, Duration::ZERO, 5), Trend::Baseline);
    }

    #[test]
    fn test_sub_millisecond_precision() {
        let base = Duration::from_micros(1000);
        assert_eq!(classify(Duration::from_micros(1499), base, 3), Trend::Steady);
        assert_eq!(classify(Duration::from_micros(1500), base, 3), Trend::Degraded);
    }

    #[test]
    fn test_delta_percent() {
        assert_eq!(delta_percent(ms(100), Duration::ZERO), None);
        let d = delta_percent(ms(160), ms(100)).unwrap();
        assert!((d - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_display() {
        assert_eq!(Trend::Degraded.to_string(), "DEGRADED");
        assert_eq!(serde_json::to_string(&Trend::Improved).unwrap(), "\"IMPROVED\"");
    }
}
