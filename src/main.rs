//! cloudpulse binary: loads configuration, starts the cycle loop and the API.

use cloudpulse::config::MonitorConfig;
use cloudpulse::history::HistoryStore;
use cloudpulse::probe::NetworkProber;
use cloudpulse::scheduler::Scheduler;
use cloudpulse::web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("cloudpulse=info".parse()?))
        .init();

    // Load configuration
    let cfg = MonitorConfig::load();
    let endpoints = cfg.load_endpoints()?;
    tracing::info!("Monitoring {} endpoints every {:?}", endpoints.len(), cfg.interval);

    // Hydrate history; a corrupt snapshot is reported and monitoring starts fresh
    let store = HistoryStore::new();
    match store.load(&cfg.history_path) {
        Ok(0) => tracing::info!("No history at {}, starting fresh", cfg.history_path.display()),
        Ok(n) => tracing::info!("Loaded history for {} services from {}", n, cfg.history_path.display()),
        Err(e) => tracing::warn!("Could not load history: {}", e),
    }

    let prober = Arc::new(NetworkProber::new(cfg.probe_settings())?);
    let scheduler = Arc::new(Scheduler::new(&cfg, endpoints, store, prober));
    let cycles = scheduler.start();

    if cfg.http_port != 0 {
        let server = Server::new(cfg.http_port, scheduler.clone());
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                tracing::error!("API server failed: {}", e);
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down after the current cycle...");
    scheduler.stop();
    cycles.await?;

    Ok(())
}
