//! HTTP query path tests.
//!
//! Tests cover:
//! - Health and readiness endpoints
//! - Dashboard after ingestion through the consumer
//! - Limit handling
//! - Store outages mapped to 503 JSON errors
//! - Daily summary before and after a rollup run
//! - Prometheus endpoint

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::stream::{self, BoxStream, StreamExt};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use wms_analytics_core::analytics::AnalyticsEngine;
use wms_analytics_core::api::{build_router, AppState};
use wms_analytics_core::bus::channel_bus;
use wms_analytics_core::config::{AnalyticsConfig, Config};
use wms_analytics_core::error::{AnalyticsError, Result};
use wms_analytics_core::jobs::{DailySummaryJob, RollupRunner, RollupState, ScheduleSpec};
use wms_analytics_core::service::AnalyticsService;
use wms_analytics_core::store::{
    EventStore, MaterialCount, MaterialEvent, MemoryEventStore, NewMaterialEvent,
};

// ============================================================================
// Helpers
// ============================================================================

/// Store whose every operation reports the database as unreachable.
struct DownStore;

#[async_trait]
impl EventStore for DownStore {
    async fn append(&self, _event: &NewMaterialEvent) -> Result<MaterialEvent> {
        Err(AnalyticsError::store_unavailable("connection refused"))
    }

    async fn count_by_material(&self, _limit: usize) -> Result<Vec<MaterialCount>> {
        Err(AnalyticsError::store_unavailable("connection refused"))
    }

    fn scan_all(&self) -> BoxStream<'_, Result<MaterialEvent>> {
        stream::once(async { Err(AnalyticsError::store_unavailable("connection refused")) }).boxed()
    }

    async fn ping(&self) -> Result<()> {
        Err(AnalyticsError::store_unavailable("connection refused"))
    }
}

fn router_for(store: Arc<dyn EventStore>) -> Router {
    let engine = AnalyticsEngine::new(store, AnalyticsConfig::default());
    build_router(AppState::new(engine, RollupState::new()))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn event(material_id: &str, event_type: &str, shelf: &str, slot: Option<&str>) -> NewMaterialEvent {
    NewMaterialEvent {
        material_id: material_id.to_string(),
        event_type: event_type.to_string(),
        timestamp: chrono::Utc::now(),
        shelf_id: Some(shelf.to_string()),
        slot_id: slot.map(str::to_string),
        worker_id: None,
    }
}

// ============================================================================
// Health Tests
// ============================================================================

#[tokio::test]
async fn test_health_is_ok() {
    let (status, body) = get(router_for(Arc::new(MemoryEventStore::new())), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_readiness_follows_store() {
    let (status, body) = get(router_for(Arc::new(MemoryEventStore::new())), "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    let (status, body) = get(router_for(Arc::new(DownStore)), "/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "STORE_UNAVAILABLE");
}

// ============================================================================
// Dashboard Tests
// ============================================================================

#[tokio::test]
async fn test_ingested_event_appears_on_dashboard() {
    let store = Arc::new(MemoryEventStore::new());
    let mut service = AnalyticsService::new(Config::default(), store.clone());
    let (publisher, bus) = channel_bus("wms_events", 16);
    service.start_with_schedule(Box::new(bus), ScheduleSpec::Interval(Duration::from_secs(3600)));

    publisher
        .publish_json(&json!({"material_id": "M1", "event_type": "PICKED", "shelf_id": "SH-01"}))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let (status, body) = get(service.router(), "/api/v1/metrics/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["most_moved_materials"],
        json!([{"material_id": "M1", "move_count": 1}])
    );
    assert_eq!(
        body["shelf_utilization"],
        json!([{"shelf_id": "SH-01", "utilization_rate": 0.0}])
    );

    tokio::time::timeout(Duration::from_secs(5), service.shutdown())
        .await
        .expect("service shutdown did not join background tasks");
}

#[tokio::test]
async fn test_dashboard_limit_and_utilization() {
    let store = Arc::new(MemoryEventStore::new());
    store.append(&event("A", "PLACED", "SH-01", Some("S1"))).await.unwrap();
    store.append(&event("A", "MOVED", "SH-01", Some("S2"))).await.unwrap();
    store.append(&event("B", "PLACED", "SH-01", Some("S1"))).await.unwrap();
    store.append(&event("C", "PLACED", "SH-02", Some("S1"))).await.unwrap();
    store.append(&event("C", "PICKED", "SH-02", Some("S1"))).await.unwrap();

    let (status, body) = get(router_for(store), "/api/v1/metrics/dashboard?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["most_moved_materials"],
        json!([{"material_id": "A", "move_count": 2}])
    );
    assert_eq!(
        body["shelf_utilization"],
        json!([
            {"shelf_id": "SH-01", "utilization_rate": 1.0},
            {"shelf_id": "SH-02", "utilization_rate": 0.0}
        ])
    );
}

#[tokio::test]
async fn test_dashboard_rejects_bad_limit_as_json() {
    for uri in ["/api/v1/metrics/dashboard?limit=abc", "/api/v1/metrics/dashboard?limit=-1"] {
        let (status, body) = get(router_for(Arc::new(MemoryEventStore::new())), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
        assert_eq!(body["error"]["message"], "Invalid query parameters");
    }
}

#[tokio::test]
async fn test_dashboard_on_empty_store() {
    let (status, body) = get(router_for(Arc::new(MemoryEventStore::new())), "/api/v1/metrics/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"most_moved_materials": [], "shelf_utilization": []}));
}

#[tokio::test]
async fn test_dashboard_store_outage_is_503() {
    let (status, body) = get(router_for(Arc::new(DownStore)), "/api/v1/metrics/dashboard").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "STORE_UNAVAILABLE");
    assert!(!body.to_string().contains("connection refused"));
}

// ============================================================================
// Daily Summary Tests
// ============================================================================

#[tokio::test]
async fn test_daily_summary_before_and_after_run() {
    let store = Arc::new(MemoryEventStore::new());
    store.append(&event("M1", "PLACED", "SH-01", Some("S1"))).await.unwrap();

    let engine = AnalyticsEngine::new(store, AnalyticsConfig::default());
    let state = RollupState::new();
    let app = build_router(AppState::new(engine.clone(), state.clone()));

    let (status, body) = get(app.clone(), "/api/v1/metrics/daily-summary").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "RECORD_NOT_FOUND");

    let runner = RollupRunner::with_state(
        Arc::new(DailySummaryJob::new(engine)),
        ScheduleSpec::Interval(Duration::from_secs(3600)),
        state,
    );
    runner.run_once().await.unwrap();

    let (status, body) = get(app, "/api/v1/metrics/daily-summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_events"], 1);
    assert_eq!(body["most_moved_materials"][0]["material_id"], "M1");
}

// ============================================================================
// Prometheus Tests
// ============================================================================

#[tokio::test]
async fn test_metrics_endpoint_is_text() {
    let app = router_for(Arc::new(MemoryEventStore::new()));
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}
