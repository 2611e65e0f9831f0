//! Timer-driven execution of a [`RollupJob`].
//!
//! Each run executes in its own task, so a panicking job surfaces as a
//! `JoinError` instead of taking the runner down. Failed runs are logged and
//! counted, and the next run is scheduled as usual.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{RollupJob, ScheduleSpec};
use crate::analytics::DailySummary;
use crate::error::{AnalyticsError, Result};
use crate::telemetry::RollupMetrics;

/// Outcome history of a rollup runner.
#[derive(Debug, Clone, Default)]
pub struct RollupStats {
    pub runs: u64,
    pub failures: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// State shared between the runner task, its handle and the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct RollupState {
    inner: Arc<RwLock<RollupStateInner>>,
}

#[derive(Debug, Default)]
struct RollupStateInner {
    latest: Option<DailySummary>,
    stats: RollupStats,
}

impl RollupState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent successful summary.
    pub fn latest(&self) -> Option<DailySummary> {
        self.inner.read().latest.clone()
    }

    pub fn stats(&self) -> RollupStats {
        self.inner.read().stats.clone()
    }

    fn record_success(&self, summary: DailySummary, at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        inner.latest = Some(summary);
        inner.stats.runs += 1;
        inner.stats.last_run_at = Some(at);
    }

    fn record_failure(&self, at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        inner.stats.runs += 1;
        inner.stats.failures += 1;
        inner.stats.last_run_at = Some(at);
    }
}

/// Runs a rollup job on a schedule.
pub struct RollupRunner {
    job: Arc<dyn RollupJob>,
    schedule: ScheduleSpec,
    state: RollupState,
}

impl RollupRunner {
    pub fn new(job: Arc<dyn RollupJob>, schedule: impl Into<ScheduleSpec>) -> Self {
        Self::with_state(job, schedule, RollupState::new())
    }

    /// Create a runner that reports into an existing state.
    pub fn with_state(
        job: Arc<dyn RollupJob>,
        schedule: impl Into<ScheduleSpec>,
        state: RollupState,
    ) -> Self {
        Self {
            job,
            schedule: schedule.into(),
            state,
        }
    }

    pub fn state(&self) -> &RollupState {
        &self.state
    }

    /// Execute the job once, containing errors and panics.
    pub async fn run_once(&self) -> Result<DailySummary> {
        let started_at = Utc::now();
        let joined = self.spawn_job().await;
        self.record(joined, started_at)
    }

    fn spawn_job(&self) -> JoinHandle<Result<DailySummary>> {
        let job = self.job.clone();
        tokio::spawn(async move { job.run().await })
    }

    fn record(
        &self,
        joined: std::result::Result<Result<DailySummary>, JoinError>,
        started_at: DateTime<Utc>,
    ) -> Result<DailySummary> {
        let name = self.job.name();
        let outcome = match joined {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(error)) => Err(AnalyticsError::schedule_failure(format!(
                "rollup job {} failed: {}",
                name, error
            ))
            .with_source(error)),
            Err(join_error) => Err(AnalyticsError::schedule_failure(format!(
                "rollup job {} aborted: {}",
                name, join_error
            ))),
        };

        match &outcome {
            Ok(summary) => {
                self.state.record_success(summary.clone(), started_at);
                RollupMetrics::run("success");
                info!(
                    job = name,
                    generated_at = %summary.generated_at,
                    total_events = summary.total_events,
                    distinct_materials = summary.distinct_materials,
                    events_last_24h = summary.events_last_24h,
                    shelves = summary.shelf_utilization.len(),
                    top_material = summary
                        .most_moved_materials
                        .first()
                        .map(|m| m.material_id.as_str())
                        .unwrap_or(""),
                    "Rollup completed"
                );
            }
            Err(error) => {
                self.state.record_failure(started_at);
                RollupMetrics::run("failure");
                error.log();
            }
        }

        outcome
    }

    /// Spawn the timer loop. Returns immediately.
    pub fn start(self, cancel: CancellationToken) -> RollupHandle {
        let state = self.state.clone();
        let loop_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            info!(job = self.job.name(), schedule = ?self.schedule, "Rollup runner started");

            loop {
                let now = Utc::now();
                let delay = self.schedule.delay_from(now);
                info!(
                    job = self.job.name(),
                    next_run = %self.schedule.next_after(now),
                    "Next rollup scheduled"
                );

                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                let started_at = Utc::now();
                let mut run = self.spawn_job();
                let joined = tokio::select! {
                    biased;
                    _ = loop_cancel.cancelled() => {
                        run.abort();
                        info!(job = self.job.name(), "Rollup run abandoned on shutdown");
                        break;
                    }
                    joined = &mut run => joined,
                };

                if self.record(joined, started_at).is_err() {
                    warn!(job = self.job.name(), "Rollup run failed, keeping schedule");
                }
            }

            info!(job = self.job.name(), "Rollup runner stopped");
        });

        RollupHandle {
            cancel,
            task,
            state,
        }
    }
}

/// Handle for controlling a running rollup runner.
pub struct RollupHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    state: RollupState,
}

impl RollupHandle {
    pub fn latest(&self) -> Option<DailySummary> {
        self.state.latest()
    }

    pub fn state(&self) -> &RollupState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the timer and wait for its task. A run in progress is aborted.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(error) = self.task.await {
            warn!(error = %error, "Rollup runner task ended abnormally");
        }
    }
}
