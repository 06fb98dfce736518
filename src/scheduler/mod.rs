//! Scheduler module: runs a monitoring cycle every interval.

mod cycle;

pub use cycle::*;

use crate::config::MonitorConfig;
use crate::endpoint::Endpoint;
use crate::history::HistoryStore;
use crate::probe::Prober;
use crate::trend::{delta_percent, Trend};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// The part of the scheduler that runs inside the background task.
#[derive(Clone)]
struct Monitor {
    endpoints: Arc<Vec<Endpoint>>,
    store: HistoryStore,
    prober: Arc<dyn Prober>,
    history_path: PathBuf,
    latest: Arc<RwLock<Option<CycleReport>>>,
}

impl Monitor {
    async fn run_once(&self) -> CycleReport {
        tracing::info!("Starting latency test cycle for {} endpoints", self.endpoints.len());

        let report = run_cycle(&self.endpoints, self.prober.clone(), &self.store).await;
        log_report(&report);

        if let Err(e) = self.store.save(&self.history_path) {
            tracing::warn!("Could not save history: {}", e);
        }

        *self.latest.write().await = Some(report.clone());
        report
    }
}

/// Drives monitoring cycles and keeps the most recent report.
pub struct Scheduler {
    monitor: Monitor,
    interval: Duration,
    stop_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(
        config: &MonitorConfig,
        endpoints: Vec<Endpoint>,
        store: HistoryStore,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            monitor: Monitor {
                endpoints: Arc::new(endpoints),
                store,
                prober,
                history_path: config.history_path.clone(),
                latest: Arc::new(RwLock::new(None)),
            },
            interval: config.interval,
            stop_tx,
        }
    }

    /// Start the cycle loop in the background.
    ///
    /// The first cycle runs immediately. A cycle that overruns the interval
    /// delays the next one rather than overlapping it.
    pub fn start(&self) -> JoinHandle<()> {
        let monitor = self.monitor.clone();
        let mut stop_rx = self.stop_tx.subscribe();
        let period = self.interval;

        tracing::info!(
            "Starting scheduler with {} endpoints every {:?}",
            monitor.endpoints.len(),
            period
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = interval.tick() => {
                        monitor.run_once().await;
                    }
                }
            }

            tracing::info!("Scheduler stopped");
        })
    }

    /// Stop the background loop after the cycle in progress, if any.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }

    /// Run a single cycle right now, outside the loop.
    pub async fn run_once(&self) -> CycleReport {
        self.monitor.run_once().await
    }

    pub async fn latest_report(&self) -> Option<CycleReport> {
        self.monitor.latest.read().await.clone()
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.monitor.endpoints
    }

    pub fn store(&self) -> &HistoryStore {
        &self.monitor.store
    }
}

/// Log a cycle's results grouped by test kind, then the summary.
fn log_report(report: &CycleReport) {
    for group in &report.groups {
        tracing::info!("=== {} tests: {} results ===", group.kind, group.results.len());

        for r in &group.results {
            if r.success {
                let delta = match r.trend {
                    Trend::Degraded | Trend::Improved => delta_percent(r.response_time, r.baseline)
                        .map(|d| format!(" ({:+.0}% vs baseline {}ms)", d, r.baseline.as_millis()))
                        .unwrap_or_default(),
                    _ => String::new(),
                };
                tracing::info!(
                    kind = %r.kind,
                    trend = %r.trend,
                    address = r.resolved_address.as_deref().unwrap_or(""),
                    "[UP] {} {}ms{}",
                    r.endpoint.label(),
                    r.response_time.as_millis(),
                    delta
                );
            } else {
                tracing::warn!(
                    kind = %r.kind,
                    "[DOWN] {} {}",
                    r.endpoint.label(),
                    r.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    let s = &report.stats;
    tracing::info!(
        "Cycle summary: {} tests, success rate {:.1}% ({}/{}), average response {}ms, took {:.2}s",
        s.total,
        s.success_rate,
        s.successes,
        s.total,
        s.mean_response.as_millis(),
        s.elapsed.as_secs_f64()
    );
}
