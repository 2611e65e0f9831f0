//! Background consumer moving bus messages into the event store.
//!
//! Every message is its own fault boundary: a malformed payload, an invalid
//! event or an exhausted store retry is logged, counted and dropped, and the
//! loop moves on. A message is acknowledged once processing has finished,
//! whatever the outcome. A message abandoned by shutdown is never
//! acknowledged, so the bus delivers it again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::normalize::normalize_now;
use crate::bus::{BusMessage, EventBus};
use crate::config::{BusConfig, IngestionConfig};
use crate::error::IngestError;
use crate::jobs::RetryPolicy;
use crate::store::{EventStore, MaterialEvent};
use crate::telemetry::IngestionMetrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════════

/// Counters shared between the consumer task and its handle.
#[derive(Debug, Clone, Default)]
pub struct IngestionStats {
    /// Messages taken off the bus
    pub received: Arc<AtomicU64>,
    /// Events appended to the store
    pub stored: Arc<AtomicU64>,
    /// Payloads that were not UTF-8 JSON
    pub malformed: Arc<AtomicU64>,
    /// Payloads rejected by validation
    pub invalid: Arc<AtomicU64>,
    /// Events dropped after store retries ran out
    pub store_failed: Arc<AtomicU64>,
    /// Bus receive errors
    pub bus_errors: Arc<AtomicU64>,
    /// Store append retries
    pub retries: Arc<AtomicU64>,
}

/// Point-in-time copy of [`IngestionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IngestionSnapshot {
    pub received: u64,
    pub stored: u64,
    pub malformed: u64,
    pub invalid: u64,
    pub store_failed: u64,
    pub bus_errors: u64,
    pub retries: u64,
}

impl IngestionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> IngestionSnapshot {
        IngestionSnapshot {
            received: self.received.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            store_failed: self.store_failed.load(Ordering::Relaxed),
            bus_errors: self.bus_errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    /// Messages that reached a final outcome.
    pub fn processed(&self) -> u64 {
        let s = self.snapshot();
        s.stored + s.malformed + s.invalid + s.store_failed
    }

    fn record_failure(&self, error: &IngestError) {
        let counter = match error {
            IngestError::MalformedPayload(_) => &self.malformed,
            IngestError::Invalid(_) => &self.invalid,
            IngestError::StoreUnavailable(_) => &self.store_failed,
            IngestError::Cancelled => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Consumer
// ═══════════════════════════════════════════════════════════════════════════════

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub retry: RetryPolicy,
    /// Pause after a bus receive error
    pub poll_error_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::new(&IngestionConfig::default(), &BusConfig::default())
    }
}

impl ConsumerConfig {
    pub fn new(ingestion: &IngestionConfig, bus: &BusConfig) -> Self {
        Self {
            retry: RetryPolicy::from(ingestion),
            poll_error_backoff: bus.poll_error_backoff,
        }
    }
}

/// Reads messages from an [`EventBus`] and appends them to an [`EventStore`].
pub struct IngestionConsumer {
    store: Arc<dyn EventStore>,
    config: ConsumerConfig,
    stats: IngestionStats,
}

impl IngestionConsumer {
    pub fn new(store: Arc<dyn EventStore>, config: ConsumerConfig) -> Self {
        Self {
            store,
            config,
            stats: IngestionStats::new(),
        }
    }

    pub fn stats(&self) -> &IngestionStats {
        &self.stats
    }

    /// Decode, validate and store one payload.
    pub async fn process_payload(
        &self,
        payload: Option<&[u8]>,
        cancel: &CancellationToken,
    ) -> Result<MaterialEvent, IngestError> {
        let raw = decode(payload)?;
        let event = normalize_now(&raw)?;

        let mut attempt = 0u32;
        loop {
            match self.store.append(&event).await {
                Ok(stored) => return Ok(stored),
                Err(error) if self.config.retry.should_retry(attempt, &error) => {
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    attempt += 1;
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    IngestionMetrics::retried();
                    warn!(
                        material_id = %event.material_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Event store append failed, retrying"
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(error) => return Err(IngestError::StoreUnavailable(error)),
            }
        }
    }

    /// Process one bus message, recording its outcome in logs, stats and metrics.
    pub async fn handle_message(
        &self,
        message: &BusMessage,
        cancel: &CancellationToken,
    ) -> Result<MaterialEvent, IngestError> {
        let started = Instant::now();
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        IngestionMetrics::received();

        let result = self.process_payload(message.payload.as_deref(), cancel).await;

        match &result {
            Ok(event) => {
                self.stats.stored.fetch_add(1, Ordering::Relaxed);
                IngestionMetrics::stored();
                debug!(
                    partition = message.partition,
                    offset = message.offset,
                    material_id = %event.material_id,
                    event_id = event.id,
                    "Event stored"
                );
            }
            Err(IngestError::Cancelled) => {
                info!(
                    partition = message.partition,
                    offset = message.offset,
                    "Message abandoned on shutdown, leaving it unacknowledged"
                );
            }
            Err(error) => {
                self.stats.record_failure(error);
                IngestionMetrics::rejected(error.kind());
                warn!(
                    partition = message.partition,
                    offset = message.offset,
                    error_kind = error.kind(),
                    error = %error,
                    "Dropping message"
                );
            }
        }

        IngestionMetrics::duration(started.elapsed());
        result
    }

    /// Spawn the consume loop. Returns immediately.
    pub fn start(self, mut bus: Box<dyn EventBus>, cancel: CancellationToken) -> IngestionHandle {
        let stats = self.stats.clone();
        let loop_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            info!("Ingestion consumer started");

            loop {
                let next = tokio::select! {
                    biased;
                    _ = loop_cancel.cancelled() => break,
                    next = bus.recv() => next,
                };

                let message = match next {
                    None => {
                        info!("Message bus closed");
                        break;
                    }
                    Some(Err(error)) => {
                        self.stats.bus_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %error, "Failed to receive from message bus");
                        tokio::select! {
                            _ = loop_cancel.cancelled() => break,
                            _ = tokio::time::sleep(self.config.poll_error_backoff) => continue,
                        }
                    }
                    Some(Ok(message)) => message,
                };

                // Outcomes are logged and counted in handle_message. Only a
                // cancelled message skips the ack.
                if let Err(error) = self.handle_message(&message, &loop_cancel).await {
                    if !error.is_final() {
                        break;
                    }
                }

                if let Err(error) = bus.ack(&message) {
                    warn!(
                        partition = message.partition,
                        offset = message.offset,
                        error = %error,
                        "Failed to acknowledge message"
                    );
                }
            }

            let s = self.stats.snapshot();
            info!(
                received = s.received,
                stored = s.stored,
                malformed = s.malformed,
                invalid = s.invalid,
                store_failed = s.store_failed,
                "Ingestion consumer stopped"
            );
        });

        IngestionHandle {
            cancel,
            task,
            stats,
        }
    }
}

fn decode(payload: Option<&[u8]>) -> Result<serde_json::Value, IngestError> {
    let bytes = match payload {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Err(IngestError::MalformedPayload("empty payload".to_string())),
    };
    let text = std::str::from_utf8(bytes)
        .map_err(|e| IngestError::MalformedPayload(format!("invalid UTF-8: {}", e)))?;
    serde_json::from_str(text)
        .map_err(|e| IngestError::MalformedPayload(format!("invalid JSON: {}", e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Handle
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle for controlling a running consumer.
pub struct IngestionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    stats: IngestionStats,
}

impl IngestionHandle {
    pub fn stats(&self) -> &IngestionStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the consumer and wait for its task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Wait for the consumer to stop on its own (closed bus or cancelled token).
    pub async fn join(self) {
        if let Err(error) = self.task.await {
            warn!(error = %error, "Ingestion consumer task ended abnormally");
        }
    }
}
