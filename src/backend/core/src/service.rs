//! Composition root: wires the store, consumer, rollup runner and HTTP router
//! together and owns their lifecycles.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::analytics::AnalyticsEngine;
use crate::api::{build_router, AppState};
use crate::bus::EventBus;
use crate::config::Config;
use crate::error::{ErrorContext, Result};
use crate::ingestion::{ConsumerConfig, IngestionConsumer, IngestionHandle, IngestionStats};
use crate::jobs::{DailySummaryJob, RollupHandle, RollupRunner, RollupState, ScheduleSpec};
use crate::store::EventStore;

/// The running analytics service.
pub struct AnalyticsService {
    config: Config,
    store: Arc<dyn EventStore>,
    engine: AnalyticsEngine,
    rollup_state: RollupState,
    cancel: CancellationToken,
    consumer: Option<IngestionHandle>,
    runner: Option<RollupHandle>,
}

impl AnalyticsService {
    pub fn new(config: Config, store: Arc<dyn EventStore>) -> Self {
        let engine = AnalyticsEngine::new(store.clone(), config.analytics.clone());
        Self {
            config,
            store,
            engine,
            rollup_state: RollupState::new(),
            cancel: CancellationToken::new(),
            consumer: None,
            runner: None,
        }
    }

    pub fn engine(&self) -> &AnalyticsEngine {
        &self.engine
    }

    pub fn rollup_state(&self) -> &RollupState {
        &self.rollup_state
    }

    /// Ingestion counters, once the consumer has been started.
    pub fn ingestion_stats(&self) -> Option<&IngestionStats> {
        self.consumer.as_ref().map(IngestionHandle::stats)
    }

    /// Root token; cancelling it stops every background task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the consumer and, when enabled, the daily rollup runner. Returns immediately.
    pub fn start(&mut self, bus: Box<dyn EventBus>) -> Result<()> {
        let schedule = ScheduleSpec::from(self.config.rollup.schedule()?);
        self.start_with_schedule(bus, schedule);
        Ok(())
    }

    /// [`start`](Self::start) with an explicit rollup schedule.
    pub fn start_with_schedule(&mut self, bus: Box<dyn EventBus>, schedule: ScheduleSpec) {
        let consumer = IngestionConsumer::new(
            self.store.clone(),
            ConsumerConfig::new(&self.config.ingestion, &self.config.bus),
        );
        self.consumer = Some(consumer.start(bus, self.cancel.child_token()));

        if self.config.rollup.enabled {
            let job = Arc::new(DailySummaryJob::new(self.engine.clone()));
            let runner = RollupRunner::with_state(job, schedule, self.rollup_state.clone());
            self.runner = Some(runner.start(self.cancel.child_token()));
        } else {
            info!("Rollup runner disabled");
        }

        info!(
            app_name = %self.config.server.app_name,
            topic = %self.config.bus.topic,
            group_id = %self.config.bus.group_id,
            "Background tasks started"
        );
    }

    pub fn router(&self) -> Router {
        build_router(AppState::new(self.engine.clone(), self.rollup_state.clone()))
    }

    /// Serve HTTP on `listener` until `signal` resolves, draining in-flight requests.
    pub async fn serve<F>(&self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = ?listener.local_addr().ok(), "HTTP server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .context("HTTP server failed")
    }

    /// Cancel and join every background task.
    pub async fn shutdown(mut self) {
        info!("Shutting down analytics service");
        self.cancel.cancel();

        if let Some(consumer) = self.consumer.take() {
            consumer.shutdown().await;
        }
        if let Some(runner) = self.runner.take() {
            runner.shutdown().await;
        }

        info!("Analytics service stopped");
    }
}
