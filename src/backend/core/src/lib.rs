#![allow(clippy::result_large_err)]
//! # WMS Analytics Core
//!
//! Ingests warehouse material-movement events from a message bus, stores them
//! in an append-only event store, and serves aggregate metrics over HTTP.
//!
//! ## Architecture
//!
//! - **Store**: Append-only event log (Postgres, or in-memory for tests)
//! - **Ingestion**: Validation plus a background bus consumer with per-message fault isolation
//! - **Bus**: Kafka consumer, or a bounded in-process channel
//! - **Analytics**: Most-moved materials and shelf utilization, computed on demand
//! - **Jobs**: Scheduled daily rollup
//! - **API**: Axum HTTP query path
//! - **Telemetry**: Structured logging and Prometheus metrics

pub mod analytics;
pub mod api;
pub mod bus;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod jobs;
pub mod service;
pub mod store;
pub mod telemetry;

pub use error::{AnalyticsError, ErrorCode, ErrorContext, ErrorSeverity, IngestError, Result, ValidationError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analytics::{AnalyticsEngine, DailySummary, DashboardMetrics, MaterialMovement, ShelfUtilization};
    pub use crate::bus::{channel_bus, BusMessage, ChannelBus, ChannelPublisher, EventBus};
    pub use crate::config::Config;
    pub use crate::error::{AnalyticsError, ErrorCode, IngestError, Result, ValidationError};
    pub use crate::ingestion::{normalize, IngestionConsumer, IngestionHandle, IngestionStats};
    pub use crate::jobs::{DailySchedule, DailySummaryJob, RollupJob, RollupRunner, ScheduleSpec};
    pub use crate::service::AnalyticsService;
    pub use crate::store::{EventStore, MaterialEvent, MemoryEventStore, NewMaterialEvent, PgEventStore};
}
