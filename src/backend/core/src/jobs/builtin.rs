//! Built-in rollup jobs.

use async_trait::async_trait;
use chrono::Utc;

use super::RollupJob;
use crate::analytics::{AnalyticsEngine, DailySummary};
use crate::error::Result;

/// Job: daily totals, most-moved materials and shelf utilization.
#[derive(Clone)]
pub struct DailySummaryJob {
    engine: AnalyticsEngine,
}

impl DailySummaryJob {
    pub fn new(engine: AnalyticsEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl RollupJob for DailySummaryJob {
    fn name(&self) -> &'static str {
        "daily_summary"
    }

    async fn run(&self) -> Result<DailySummary> {
        self.engine.daily_summary(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::store::{EventStore, MemoryEventStore, NewMaterialEvent};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_daily_summary_job_counts_events() {
        let store = Arc::new(MemoryEventStore::new());
        store
            .append(&NewMaterialEvent {
                material_id: "M1".into(),
                event_type: "PLACED".into(),
                timestamp: Utc::now(),
                shelf_id: Some("SH-01".into()),
                slot_id: Some("A1".into()),
                worker_id: None,
            })
            .await
            .unwrap();

        let job = DailySummaryJob::new(AnalyticsEngine::new(store, AnalyticsConfig::default()));
        assert_eq!(job.name(), "daily_summary");

        let summary = job.run().await.unwrap();
        assert_eq!(summary.total_events, 1);
        assert_eq!(summary.events_last_24h, 1);
    }
}
