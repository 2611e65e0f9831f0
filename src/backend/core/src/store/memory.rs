//! In-memory event store for tests and local runs without Postgres.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{EventStore, MaterialCount, MaterialEvent, NewMaterialEvent};
use crate::error::Result;

/// Event store backed by a `Vec` behind a read-write lock.
///
/// Ids are `position + 1`, assigned under the write lock.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<MaterialEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clone of every stored event, in id order.
    pub fn snapshot(&self) -> Vec<MaterialEvent> {
        self.events.read().clone()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: &NewMaterialEvent) -> Result<MaterialEvent> {
        let mut events = self.events.write();
        let stored = event.with_id(events.len() as i64 + 1);
        events.push(stored.clone());
        Ok(stored)
    }

    async fn count_by_material(&self, limit: usize) -> Result<Vec<MaterialCount>> {
        // material_id -> (count, first id)
        let mut counts: HashMap<String, (i64, i64)> = HashMap::new();
        for event in self.events.read().iter() {
            let entry = counts
                .entry(event.material_id.clone())
                .or_insert((0, event.id));
            entry.0 += 1;
        }

        let mut rows: Vec<_> = counts.into_iter().collect();
        rows.sort_by(|(_, (a_count, a_first)), (_, (b_count, b_first))| {
            b_count.cmp(a_count).then(a_first.cmp(b_first))
        });

        Ok(rows
            .into_iter()
            .take(limit)
            .map(|(material_id, (move_count, _))| MaterialCount {
                material_id,
                move_count,
            })
            .collect())
    }

    fn scan_all(&self) -> BoxStream<'_, Result<MaterialEvent>> {
        stream::unfold(0usize, move |index| async move {
            let event = self.events.read().get(index).cloned()?;
            Some((Ok(event), index + 1))
        })
        .boxed()
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
