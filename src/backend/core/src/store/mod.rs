//! Event store: the append-only ground truth for material events.
//!
//! Only a store turns a [`NewMaterialEvent`] into a [`MaterialEvent`], so an
//! event id always comes from the store's own concurrency control. There is no
//! update or delete path.

pub mod memory;
pub mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A stored warehouse event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MaterialEvent {
    /// Store-assigned, strictly increasing
    pub id: i64,
    pub material_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub shelf_id: Option<String>,
    pub slot_id: Option<String>,
    pub worker_id: Option<String>,
}

/// A validated event that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMaterialEvent {
    pub material_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub shelf_id: Option<String>,
    pub slot_id: Option<String>,
    pub worker_id: Option<String>,
}

impl NewMaterialEvent {
    pub(crate) fn with_id(&self, id: i64) -> MaterialEvent {
        MaterialEvent {
            id,
            material_id: self.material_id.clone(),
            event_type: self.event_type.clone(),
            timestamp: self.timestamp,
            shelf_id: self.shelf_id.clone(),
            slot_id: self.slot_id.clone(),
            worker_id: self.worker_id.clone(),
        }
    }
}

/// Number of events recorded for one material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MaterialCount {
    pub material_id: String,
    pub move_count: i64,
}

/// Append-only storage for material events.
///
/// Implementations must be safe for concurrent `append` calls from many
/// tasks and must never block readers on writers beyond read-committed
/// isolation.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one validated event and return it with its assigned id.
    async fn append(&self, event: &NewMaterialEvent) -> Result<MaterialEvent>;

    /// Event counts per material, highest first, at most `limit` rows.
    ///
    /// Ties are ordered by the material's first appearance (lowest id).
    async fn count_by_material(&self, limit: usize) -> Result<Vec<MaterialCount>>;

    /// Every stored event in ascending id order, read lazily.
    fn scan_all(&self) -> BoxStream<'_, Result<MaterialEvent>>;

    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<()>;
}
