//! Read-only HTTP API over the history store and the latest cycle.

mod handlers;

pub use handlers::*;

use crate::history::HistoryStore;
use crate::scheduler::Scheduler;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: HistoryStore,
    pub scheduler: Arc<Scheduler>,
}

/// API server for cloudpulse.
pub struct Server {
    port: u16,
    state: AppState,
}

impl Server {
    pub fn new(port: u16, scheduler: Arc<Scheduler>) -> Self {
        Self {
            port,
            state: AppState {
                store: scheduler.store().clone(),
                scheduler,
            },
        }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/healthz", get(handlers::handle_healthz))
            .route("/api/endpoints", get(handlers::handle_get_endpoints))
            .route("/api/history", get(handlers::handle_get_history))
            .route("/api/summary", get(handlers::handle_get_summary))
            .route("/api/cycles/latest", get(handlers::handle_get_latest_cycle))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until the task is dropped or the listener fails.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let router = self.routes();

        tracing::info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
