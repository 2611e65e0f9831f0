//! Message bus abstraction for the ingestion consumer.
//!
//! - [`ChannelBus`]: bounded in-process channel, used by tests and local runs
//! - `KafkaBus`: `rdkafka` stream consumer (feature `kafka`)

pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;

pub use channel::{channel_bus, ChannelBus, ChannelPublisher};
#[cfg(feature = "kafka")]
pub use kafka::KafkaBus;

use async_trait::async_trait;

use crate::error::Result;

/// One record read from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

/// A source of messages with at-least-once delivery.
#[async_trait]
pub trait EventBus: Send {
    /// Next message. `None` means the bus is closed and no more messages will arrive.
    async fn recv(&mut self) -> Option<Result<BusMessage>>;

    /// Mark a message as processed so it is not redelivered after a restart.
    fn ack(&mut self, message: &BusMessage) -> Result<()>;
}
