//! Job definitions and retry policy.
//!
//! - **RollupJob trait**: the interface scheduled rollups implement
//! - **BackoffStrategy**: delay calculation between retries
//! - **RetryPolicy**: bounded retries for retryable errors

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::analytics::DailySummary;
use crate::config::IngestionConfig;
use crate::error::{AnalyticsError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Rollup Job Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// A periodic computation over the event store.
#[async_trait]
pub trait RollupJob: Send + Sync + 'static {
    /// Stable name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Compute one summary.
    async fn run(&self) -> Result<DailySummary>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Backoff Strategy
// ═══════════════════════════════════════════════════════════════════════════════

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed {
        delay_ms: u64,
    },
    /// Exponential increase in delay (initial * multiplier^attempt), capped
    Exponential {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl BackoffStrategy {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ms = match self {
            Self::Fixed { delay_ms } => *delay_ms,
            Self::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                let delay = (*initial_delay_ms as f64) * multiplier.powi(attempt as i32);
                delay.min(*max_delay_ms as f64) as u64
            }
        };

        Duration::from_millis(ms)
    }

    /// Create a fixed backoff strategy.
    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed {
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Doubling delays between `initial` and `max`.
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self::Exponential {
            initial_delay_ms: initial.as_millis() as u64,
            max_delay_ms: max.as_millis() as u64,
            multiplier: 2.0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Retry Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_attempts: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Check if another retry should be attempted after `attempt` retries.
    ///
    /// Only errors whose code is retryable are retried.
    pub fn should_retry(&self, attempt: u32, error: &AnalyticsError) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay_for_attempt(attempt)
    }
}

impl From<&IngestionConfig> for RetryPolicy {
    fn from(config: &IngestionConfig) -> Self {
        Self {
            max_attempts: config.max_store_retries,
            backoff: BackoffStrategy::exponential(
                config.retry_initial_delay,
                config.retry_max_delay,
            ),
        }
    }
}
