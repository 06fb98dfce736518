//! One monitoring cycle: expand, dispatch, await all, aggregate.

use crate::endpoint::{Endpoint, ServiceKey, TestKind};
use crate::history::HistoryStore;
use crate::probe::{ProbeOutcome, Prober};
use crate::trend::{classify, Trend};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One (endpoint, test kind) pair to probe.
#[derive(Debug, Clone)]
pub struct ProbeTask {
    pub endpoint: Endpoint,
    pub kind: TestKind,
}

/// Outcome of one task after aggregation.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub endpoint: Endpoint,
    pub key: ServiceKey,
    pub kind: TestKind,
    pub success: bool,
    #[serde(rename = "response_time_ms", serialize_with = "as_millis")]
    pub response_time: Duration,
    pub resolved_address: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub trend: Trend,
    /// Mean of the window before this result was recorded.
    #[serde(rename = "baseline_ms", serialize_with = "as_millis")]
    pub baseline: Duration,
    pub sample_count: usize,
}

/// Results of one test kind, in task order.
#[derive(Debug, Clone, Serialize)]
pub struct ResultGroup {
    pub kind: TestKind,
    pub results: Vec<ProbeResult>,
}

/// Cycle-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleStats {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    /// Percentage of successful probes; 0 for an empty cycle.
    pub success_rate: f64,
    /// Mean response time over successful probes only.
    #[serde(rename = "mean_response_ms", serialize_with = "as_millis")]
    pub mean_response: Duration,
    /// Wall-clock duration of the cycle.
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl CycleStats {
    fn from_results<'a>(results: impl IntoIterator<Item = &'a ProbeResult>, elapsed: Duration) -> Self {
        let mut stats = CycleStats {
            elapsed,
            ..Default::default()
        };
        let mut total_response = Duration::ZERO;

        for r in results {
            stats.total += 1;
            if r.success {
                stats.successes += 1;
                total_response += r.response_time;
            }
        }

        stats.failures = stats.total - stats.successes;
        if stats.total > 0 {
            stats.success_rate = stats.successes as f64 / stats.total as f64 * 100.0;
        }
        if stats.successes > 0 {
            stats.mean_response = total_response / stats.successes as u32;
        }
        stats
    }
}

/// Everything a cycle produced, ready for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// Non-empty groups in reporting order (ping, DNS, HTTP).
    pub groups: Vec<ResultGroup>,
    pub stats: CycleStats,
}

impl CycleReport {
    pub fn group(&self, kind: TestKind) -> Option<&ResultGroup> {
        self.groups.iter().find(|g| g.kind == kind)
    }

    pub fn results(&self) -> impl Iterator<Item = &ProbeResult> {
        self.groups.iter().flat_map(|g| g.results.iter())
    }
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_nanos() as f64 / 1_000_000.0)
}

/// One task per enabled test kind of every endpoint.
pub fn expand_tasks(endpoints: &[Endpoint]) -> Vec<ProbeTask> {
    endpoints
        .iter()
        .flat_map(|endpoint| {
            endpoint.test_kinds().map(move |kind| ProbeTask {
                endpoint: endpoint.clone(),
                kind,
            })
        })
        .collect()
}

/// Run every enabled probe concurrently, then fold the results into `store`.
///
/// Aggregation starts only after the last probe has returned, and walks the
/// results in task order so the outcome does not depend on completion order.
pub async fn run_cycle(
    endpoints: &[Endpoint],
    prober: Arc<dyn Prober>,
    store: &HistoryStore,
) -> CycleReport {
    let started_at = Utc::now();
    let start = Instant::now();

    let tasks = expand_tasks(endpoints);

    let handles: Vec<_> = tasks
        .iter()
        .map(|task| {
            let prober = prober.clone();
            let endpoint = task.endpoint.clone();
            let kind = task.kind;
            tokio::spawn(async move {
                let timestamp = Utc::now();
                let outcome = prober.probe(&endpoint, kind).await;
                (timestamp, outcome)
            })
        })
        .collect();

    // Every task is already running, so awaiting in order only waits for the slowest
    let mut completed = Vec::with_capacity(handles.len());
    for (task, handle) in tasks.into_iter().zip(handles) {
        let (timestamp, outcome) = match handle.await {
            Ok(done) => done,
            Err(e) => {
                tracing::error!("{} probe task for {} failed: {}", task.kind, task.endpoint.label(), e);
                (Utc::now(), ProbeOutcome::failure(format!("probe task failed: {}", e), None))
            }
        };
        completed.push((task, timestamp, outcome));
    }

    let results: Vec<_> = completed
        .into_iter()
        .map(|(task, timestamp, outcome)| aggregate(store, task, timestamp, outcome))
        .collect();

    let stats = CycleStats::from_results(&results, start.elapsed());
    CycleReport {
        started_at,
        groups: group_by_kind(results),
        stats,
    }
}

/// Classify against the pre-update baseline, then record successes.
///
/// Failures are classified too, with a zero response time, so a probe that
/// goes down against an established baseline reports `Improved`.
fn aggregate(
    store: &HistoryStore,
    task: ProbeTask,
    timestamp: DateTime<Utc>,
    outcome: ProbeOutcome,
) -> ProbeResult {
    let key = ServiceKey::new(&task.endpoint, task.kind);
    let (baseline, sample_count) = store.baseline(key.as_str());

    let response_time = if outcome.success { outcome.elapsed } else { Duration::ZERO };
    let trend = classify(response_time, baseline, sample_count);

    if outcome.success {
        store.add(key.as_str(), timestamp, response_time);
    }

    ProbeResult {
        endpoint: task.endpoint,
        key,
        kind: task.kind,
        success: outcome.success,
        response_time,
        resolved_address: outcome.resolved_address,
        error: outcome.error,
        timestamp,
        trend,
        baseline,
        sample_count,
    }
}

fn group_by_kind(results: Vec<ProbeResult>) -> Vec<ResultGroup> {
    let mut groups: Vec<ResultGroup> = TestKind::ALL
        .iter()
        .map(|&kind| ResultGroup {
            kind,
            results: Vec::new(),
        })
        .collect();

    for result in results {
        if let Some(group) = groups.iter_mut().find(|g| g.kind == result.kind) {
            group.results.push(result);
        }
    }

    groups.retain(|g| !g.results.is_empty());
    groups
}
