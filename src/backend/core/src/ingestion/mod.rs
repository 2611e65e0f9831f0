//! Event ingestion: payload validation and the background bus consumer.

pub mod consumer;
pub mod normalize;

pub use consumer::{
    ConsumerConfig, IngestionConsumer, IngestionHandle, IngestionSnapshot, IngestionStats,
};
pub use normalize::{normalize, normalize_now, parse_timestamp};
