//! Bounded in-process bus over a `tokio::sync::mpsc` channel.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{BusMessage, EventBus};
use crate::error::{AnalyticsError, ErrorCode, Result};

/// Create a connected publisher and bus for `topic`.
///
/// At most `capacity` messages are buffered; `publish` waits when the buffer
/// is full. The bus closes once every publisher has been dropped.
pub fn channel_bus(topic: impl Into<String>, capacity: usize) -> (ChannelPublisher, ChannelBus) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let committed = Arc::new(AtomicI64::new(0));

    let publisher = ChannelPublisher {
        topic: topic.into(),
        tx,
        next_offset: Arc::new(AtomicI64::new(0)),
        committed: committed.clone(),
    };

    (publisher, ChannelBus { rx, committed })
}

/// Producer half of a [`ChannelBus`].
#[derive(Clone, Debug)]
pub struct ChannelPublisher {
    topic: String,
    tx: mpsc::Sender<Result<BusMessage>>,
    next_offset: Arc<AtomicI64>,
    committed: Arc<AtomicI64>,
}

impl ChannelPublisher {
    /// Publish a raw payload. Returns the offset assigned to it.
    pub async fn publish(&self, payload: impl Into<Vec<u8>>) -> Result<i64> {
        self.send(Some(payload.into())).await
    }

    /// Publish a JSON value.
    pub async fn publish_json(&self, value: &serde_json::Value) -> Result<i64> {
        self.publish(serde_json::to_vec(value)?).await
    }

    /// Publish a message without a payload.
    pub async fn publish_empty(&self) -> Result<i64> {
        self.send(None).await
    }

    /// Deliver a receive error to the consumer.
    pub async fn publish_error(&self, message: impl Into<String>) -> Result<()> {
        self.tx
            .send(Err(AnalyticsError::new(ErrorCode::BusError, message.into())))
            .await
            .map_err(|_| closed())
    }

    /// Offset of the next message the consumer has not acknowledged yet.
    pub fn committed_offset(&self) -> i64 {
        self.committed.load(Ordering::Acquire)
    }

    async fn send(&self, payload: Option<Vec<u8>>) -> Result<i64> {
        let offset = self.next_offset.fetch_add(1, Ordering::AcqRel);
        let message = BusMessage {
            topic: self.topic.clone(),
            partition: 0,
            offset,
            key: None,
            payload,
        };
        self.tx.send(Ok(message)).await.map_err(|_| closed())?;
        Ok(offset)
    }
}

fn closed() -> AnalyticsError {
    AnalyticsError::new(ErrorCode::BusError, "Channel bus is closed")
}

/// Consumer half of a bounded in-process bus.
#[derive(Debug)]
pub struct ChannelBus {
    rx: mpsc::Receiver<Result<BusMessage>>,
    committed: Arc<AtomicI64>,
}

#[async_trait]
impl EventBus for ChannelBus {
    async fn recv(&mut self) -> Option<Result<BusMessage>> {
        self.rx.recv().await
    }

    fn ack(&mut self, message: &BusMessage) -> Result<()> {
        self.committed.fetch_max(message.offset + 1, Ordering::AcqRel);
        Ok(())
    }
}
