//! HTTP request handlers.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use super::AppState;
use crate::analytics::{DailySummary, DashboardMetrics};
use crate::error::{AnalyticsError, ErrorCode, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Health Handlers
// ═══════════════════════════════════════════════════════════════════════════════

/// Liveness.
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness: the event store must answer.
pub async fn readiness_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    state.engine.ping().await?;
    Ok(Json(serde_json::json!({ "status": "ready" })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Metrics Handlers
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub limit: Option<usize>,
}

pub async fn dashboard(
    State(state): State<AppState>,
    query: std::result::Result<Query<DashboardQuery>, QueryRejection>,
) -> Result<Json<DashboardMetrics>> {
    let Query(query) = query.map_err(|rejection| {
        AnalyticsError::new(ErrorCode::InvalidInput, "Invalid query parameters")
            .with_internal_message(rejection.body_text())
    })?;
    let metrics = state.engine.dashboard(query.limit).await?;
    Ok(Json(metrics))
}

pub async fn daily_summary(State(state): State<AppState>) -> Result<Json<DailySummary>> {
    state
        .rollup
        .latest()
        .map(Json)
        .ok_or_else(|| AnalyticsError::not_found("Daily summary"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Prometheus Handler
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        crate::telemetry::render(),
    )
}
