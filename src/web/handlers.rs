//! HTTP request handlers.

use super::AppState;
use crate::history::{overview, summarize_all, FleetOverview, ServiceSummary, Snapshot};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub async fn handle_healthz() -> impl IntoResponse {
    "ok"
}

pub async fn handle_get_endpoints(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.endpoints().to_vec())
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub key: Option<String>,
}

/// Full snapshot, or a single key's window when `key` is given.
pub async fn handle_get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    match query.key {
        Some(key) => match state.store.history(&key) {
            Some(points) => {
                let mut one = Snapshot::new();
                one.insert(key, points);
                Json(one).into_response()
            }
            None => (StatusCode::NOT_FOUND, format!("no history for {}", key)).into_response(),
        },
        None => Json(state.store.snapshot()).into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub last_update: String,
    pub total_endpoints: usize,
    pub summary: Vec<ServiceSummary>,
    pub overview: FleetOverview,
}

pub async fn handle_get_summary(State(state): State<AppState>) -> impl IntoResponse {
    let summary = summarize_all(&state.store.snapshot());
    let overview = overview(&summary);

    Json(SummaryResponse {
        last_update: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        total_endpoints: summary.len(),
        summary,
        overview,
    })
}

pub async fn handle_get_latest_cycle(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.latest_report().await {
        Some(report) => Json(report).into_response(),
        None => (StatusCode::NOT_FOUND, "no cycle has completed yet").into_response(),
    }
}
