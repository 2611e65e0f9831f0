//! HTTP query path.
//!
//! - `GET /health` - liveness
//! - `GET /health/ready` - event store reachable
//! - `GET /api/v1/metrics/dashboard[?limit=N]` - most-moved materials and shelf utilization
//! - `GET /api/v1/metrics/daily-summary` - latest rollup
//! - `GET /metrics` - Prometheus exposition

mod handlers;

pub use handlers::DashboardQuery;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::analytics::AnalyticsEngine;
use crate::jobs::RollupState;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: AnalyticsEngine,
    pub rollup: RollupState,
}

impl AppState {
    pub fn new(engine: AnalyticsEngine, rollup: RollupState) -> Self {
        Self { engine, rollup }
    }
}

/// Build the API router.
///
/// # Example
///
/// ```rust,ignore
/// let app = build_router(AppState::new(engine, RollupState::new()));
/// axum::serve(listener, app).await?;
/// ```
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest("/api/v1", v1_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/metrics/dashboard", get(handlers::dashboard))
        .route("/metrics/daily-summary", get(handlers::daily_summary))
}
