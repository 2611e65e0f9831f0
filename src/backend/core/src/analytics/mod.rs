//! Aggregation engine.
//!
//! Every metric is computed on demand from the event store. Reads run
//! concurrently with ingestion and see whatever was committed when the call
//! started. Store errors are returned to the caller, never replaced with
//! empty results.

pub mod utilization;

pub use utilization::{Movement, ShelfUtilization, UtilizationTracker};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::config::AnalyticsConfig;
use crate::error::Result;
use crate::store::{EventStore, MaterialCount};

/// One entry of the most-moved list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialMovement {
    pub material_id: String,
    pub move_count: i64,
}

impl From<MaterialCount> for MaterialMovement {
    fn from(count: MaterialCount) -> Self {
        Self {
            material_id: count.material_id,
            move_count: count.move_count,
        }
    }
}

/// Response body of the dashboard endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub most_moved_materials: Vec<MaterialMovement>,
    pub shelf_utilization: Vec<ShelfUtilization>,
}

/// Output of one rollup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub generated_at: DateTime<Utc>,
    pub total_events: u64,
    pub distinct_materials: u64,
    /// Events whose timestamp falls in the 24 hours before `generated_at`
    pub events_last_24h: u64,
    pub events_by_type: BTreeMap<String, u64>,
    pub most_moved_materials: Vec<MaterialMovement>,
    pub shelf_utilization: Vec<ShelfUtilization>,
}

/// Read-side computations over an [`EventStore`].
#[derive(Clone)]
pub struct AnalyticsEngine {
    store: Arc<dyn EventStore>,
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    pub fn new(store: Arc<dyn EventStore>, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Clamp a caller supplied limit to `1..=max_limit`, defaulting to `top_materials_limit`.
    pub fn effective_limit(&self, limit: Option<usize>) -> usize {
        limit
            .unwrap_or(self.config.top_materials_limit)
            .clamp(1, self.config.max_limit.max(1))
    }

    /// Materials with the most events, highest first.
    pub async fn most_moved_materials(&self, limit: Option<usize>) -> Result<Vec<MaterialMovement>> {
        let limit = self.effective_limit(limit);
        let counts = self.store.count_by_material(limit).await?;
        Ok(counts.into_iter().map(MaterialMovement::from).collect())
    }

    /// Current occupancy of each shelf, from a full replay of the store.
    pub async fn shelf_utilization(&self) -> Result<Vec<ShelfUtilization>> {
        let mut tracker = UtilizationTracker::new();
        let mut events = self.store.scan_all();
        while let Some(event) = events.try_next().await? {
            tracker.observe(&event);
        }
        Ok(tracker.finish(&self.config.shelf_capacity))
    }

    pub async fn dashboard(&self, limit: Option<usize>) -> Result<DashboardMetrics> {
        let (most_moved_materials, shelf_utilization) =
            tokio::try_join!(self.most_moved_materials(limit), self.shelf_utilization())?;

        Ok(DashboardMetrics {
            most_moved_materials,
            shelf_utilization,
        })
    }

    /// Totals for the rollup, from a single scan plus the most-moved query.
    pub async fn daily_summary(&self, now: DateTime<Utc>) -> Result<DailySummary> {
        let window_start = now - ChronoDuration::hours(24);

        let mut total_events = 0u64;
        let mut events_last_24h = 0u64;
        let mut materials = HashSet::new();
        let mut events_by_type: BTreeMap<String, u64> = BTreeMap::new();
        let mut tracker = UtilizationTracker::new();

        let mut events = self.store.scan_all();
        while let Some(event) = events.try_next().await? {
            total_events += 1;
            if event.timestamp > window_start && event.timestamp <= now {
                events_last_24h += 1;
            }
            *events_by_type.entry(event.event_type.clone()).or_default() += 1;
            tracker.observe(&event);
            materials.insert(event.material_id);
        }
        drop(events);

        let most_moved_materials = self.most_moved_materials(None).await?;

        Ok(DailySummary {
            generated_at: now,
            total_events,
            distinct_materials: materials.len() as u64,
            events_last_24h,
            events_by_type,
            most_moved_materials,
            shelf_utilization: tracker.finish(&self.config.shelf_capacity),
        })
    }

    /// Store connectivity check for readiness probes.
    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }
}
