//! Postgres event store tests.
//!
//! Tests cover:
//! - Per-material counts, limits and the first-appearance tie-break
//! - Unique ids and ascending scan order under concurrent appends
//! - Column round-trip, including the quoted "timestamp" column
//! - Pool failures mapped to StoreUnavailable
//!
//! Requirements:
//!   - DATABASE_URL env var (Postgres). Tests skip when it is not set.
//!
//! Each test runs in its own schema, dropped at the end.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use futures::TryStreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Executor;
use wms_analytics_core::error::ErrorCode;
use wms_analytics_core::store::{EventStore, NewMaterialEvent, PgEventStore};

// ============================================================================
// Harness
// ============================================================================

static NEXT_SCHEMA: AtomicU32 = AtomicU32::new(0);

struct TestDb {
    admin: PgPool,
    schema: String,
    store: PgEventStore,
}

impl TestDb {
    async fn try_new() -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let schema = format!(
            "analytics_test_{}_{}",
            std::process::id(),
            NEXT_SCHEMA.fetch_add(1, Ordering::SeqCst)
        );

        let admin = PgPool::connect(&url).await.expect("connect to DATABASE_URL");
        admin
            .execute(format!("CREATE SCHEMA {}", schema).as_str())
            .await
            .expect("create test schema");

        let search_path = format!("SET search_path TO {}", schema);
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .after_connect(move |conn, _meta| {
                let sql = search_path.clone();
                Box::pin(async move {
                    conn.execute(sql.as_str()).await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await
            .expect("connect test pool");

        let store = PgEventStore::new(pool);
        store.migrate().await.expect("apply migrations");

        Some(Self { admin, schema, store })
    }

    async fn cleanup(self) {
        self.store.pool().close().await;
        self.admin
            .execute(format!("DROP SCHEMA {} CASCADE", self.schema).as_str())
            .await
            .expect("drop test schema");
    }
}

macro_rules! test_db {
    () => {
        match TestDb::try_new().await {
            Some(db) => db,
            None => {
                eprintln!("Skipping: DATABASE_URL not available");
                return;
            }
        }
    };
}

fn at() -> DateTime<Utc> {
    // Postgres keeps microseconds.
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap() + ChronoDuration::microseconds(123_456)
}

fn event(material_id: &str) -> NewMaterialEvent {
    NewMaterialEvent {
        material_id: material_id.to_string(),
        event_type: "MOVED".to_string(),
        timestamp: at(),
        shelf_id: None,
        slot_id: None,
        worker_id: None,
    }
}

// ============================================================================
// Count Tests
// ============================================================================

#[tokio::test]
async fn test_counts_order_limit_and_tie_break() {
    let db = test_db!();

    for id in ["A", "A", "B"] {
        db.store.append(&event(id)).await.unwrap();
    }
    let counts = db.store.count_by_material(10).await.unwrap();
    assert_eq!(counts.len(), 2);
    assert_eq!((counts[0].material_id.as_str(), counts[0].move_count), ("A", 2));
    assert_eq!((counts[1].material_id.as_str(), counts[1].move_count), ("B", 1));

    let top = db.store.count_by_material(1).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].material_id, "A");

    // C then D tie at one event each; C appeared first.
    db.store.append(&event("C")).await.unwrap();
    db.store.append(&event("D")).await.unwrap();
    db.store.append(&event("B")).await.unwrap();
    let ids: Vec<_> = db
        .store
        .count_by_material(usize::MAX)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.material_id)
        .collect();
    assert_eq!(ids, vec!["A", "B", "C", "D"]);

    db.cleanup().await;
}

#[tokio::test]
async fn test_empty_table() {
    let db = test_db!();

    assert!(db.store.count_by_material(10).await.unwrap().is_empty());
    let scanned: Vec<_> = db.store.scan_all().try_collect().await.unwrap();
    assert!(scanned.is_empty());
    db.store.ping().await.unwrap();

    db.cleanup().await;
}

// ============================================================================
// Append Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_get_unique_ascending_ids() {
    let db = test_db!();
    let store = Arc::new(db.store.clone());
    let tasks = 8;
    let per_task = 25;

    let mut handles = Vec::new();
    for t in 0..tasks {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..per_task {
                store.append(&event(&format!("M{}-{}", t, i))).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let scanned: Vec<_> = store.scan_all().try_collect().await.unwrap();
    assert_eq!(scanned.len(), tasks * per_task);
    assert!(scanned.windows(2).all(|w| w[0].id < w[1].id));

    db.cleanup().await;
}

#[tokio::test]
async fn test_columns_round_trip() {
    let db = test_db!();
    let new = NewMaterialEvent {
        shelf_id: Some("SH-01".into()),
        slot_id: Some("A1".into()),
        worker_id: Some("W1".into()),
        ..event("M1")
    };

    let stored = db.store.append(&new).await.unwrap();
    let scanned: Vec<_> = db.store.scan_all().try_collect().await.unwrap();

    assert_eq!(scanned.len(), 1);
    let row = &scanned[0];
    assert_eq!(row.id, stored.id);
    assert_eq!(row.material_id, "M1");
    assert_eq!(row.event_type, "MOVED");
    assert_eq!(row.timestamp, at());
    assert_eq!(row.shelf_id.as_deref(), Some("SH-01"));
    assert_eq!(row.slot_id.as_deref(), Some("A1"));
    assert_eq!(row.worker_id.as_deref(), Some("W1"));

    db.cleanup().await;
}

// ============================================================================
// Failure Mapping Tests
// ============================================================================

#[tokio::test]
async fn test_closed_pool_is_store_unavailable() {
    let db = test_db!();
    db.store.pool().close().await;

    let err = db.store.append(&event("M1")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::StoreUnavailable);
    assert!(err.is_retryable());

    let err = db.store.ping().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::StoreUnavailable);

    db.cleanup().await;
}
