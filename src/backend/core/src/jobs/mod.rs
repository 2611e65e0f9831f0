//! Scheduled rollups.
//!
//! ```text
//! ┌─────────────┐    ┌──────────────┐    ┌──────────────┐
//! │  Schedule   │───▶│ RollupRunner │───▶│  RollupJob   │
//! │ (Daily /    │    │ (timer task) │    │ (own task)   │
//! │  Interval)  │    └──────┬───────┘    └──────────────┘
//! └─────────────┘           ▼
//!                    ┌──────────────┐
//!                    │ RollupState  │──▶ GET /api/v1/metrics/daily-summary
//!                    └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let job = Arc::new(DailySummaryJob::new(engine));
//! let handle = RollupRunner::new(job, DailySchedule::parse("00:00")?).start(cancel.child_token());
//! // ...
//! handle.shutdown().await;
//! ```

pub mod job;
pub mod runner;
pub mod scheduler;

pub use job::{BackoffStrategy, RetryPolicy, RollupJob};
pub use runner::{RollupHandle, RollupRunner, RollupState, RollupStats};
pub use scheduler::{DailySchedule, ScheduleSpec};

// Built-in jobs
mod builtin;
pub use builtin::DailySummaryJob;
