//! Telemetry: structured logging and Prometheus metrics.
//!
//! - **Logging**: `tracing-subscriber` with JSON, pretty or compact output
//! - **Metrics**: counters and histograms exported in Prometheus text format
//!
//! # Example
//!
//! ```rust,no_run
//! use wms_analytics_core::telemetry::{init_logging, init_metrics, LoggingConfig};
//!
//! init_logging(&LoggingConfig::default()).expect("Failed to initialize logging");
//! init_metrics().expect("Failed to initialize metrics");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{init_metrics, render, IngestionMetrics, RollupMetrics};
