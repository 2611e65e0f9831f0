//! Kafka consumer over `rdkafka`.
//!
//! Offsets are stored manually after a message has been processed and
//! committed by the auto-commit timer, which gives at-least-once delivery.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use tracing::info;

use super::{BusMessage, EventBus};
use crate::config::BusConfig;
use crate::error::Result;

pub struct KafkaBus {
    consumer: StreamConsumer,
}

impl KafkaBus {
    /// Create a consumer in the configured group and subscribe to the topic.
    pub fn new(config: &BusConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("queued.max.messages.kbytes", config.queued_max_kbytes.to_string())
            .create()?;

        consumer.subscribe(&[config.topic.as_str()])?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Subscribed to Kafka topic"
        );

        Ok(Self { consumer })
    }
}

#[async_trait]
impl EventBus for KafkaBus {
    async fn recv(&mut self) -> Option<Result<BusMessage>> {
        let result = self.consumer.recv().await.map(|message| BusMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec),
        });
        Some(result.map_err(Into::into))
    }

    fn ack(&mut self, message: &BusMessage) -> Result<()> {
        self.consumer
            .store_offset(&message.topic, message.partition, message.offset + 1)?;
        Ok(())
    }
}
