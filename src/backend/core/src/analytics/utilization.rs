//! Shelf utilization from an ordered replay of material events.
//!
//! A placing event moves a material into `(shelf_id, slot_id)`. A removing
//! event clears the material's location. Every `(shelf_id, slot_id)` pair
//! seen on any event counts as a known slot of that shelf.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::store::MaterialEvent;

/// Occupied share of one shelf's slots, between 0.0 and 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfUtilization {
    pub shelf_id: String,
    pub utilization_rate: f64,
}

/// Effect of an event type on a material's location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Place,
    Remove,
    Other,
}

impl Movement {
    /// Classify an event type. Case-insensitive, and a `MATERIAL.` or
    /// `MATERIAL_` prefix is ignored.
    pub fn classify(event_type: &str) -> Self {
        let upper = event_type.trim().to_ascii_uppercase();
        let tag = upper
            .strip_prefix("MATERIAL.")
            .or_else(|| upper.strip_prefix("MATERIAL_"))
            .unwrap_or(&upper);

        match tag {
            "PLACED" | "MOVED" | "STORED" | "RESTOCKED" | "RETURNED" => Self::Place,
            "PICKED" | "REMOVED" | "SHIPPED" | "CONSUMED" => Self::Remove,
            _ => Self::Other,
        }
    }
}

/// Incremental occupancy state. Feed events in id order, then call [`finish`].
///
/// [`finish`]: UtilizationTracker::finish
#[derive(Debug, Default)]
pub struct UtilizationTracker {
    known_slots: BTreeMap<String, BTreeSet<String>>,
    locations: HashMap<String, (String, String)>,
}

impl UtilizationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &MaterialEvent) {
        let shelf = event.shelf_id.as_deref();
        let slot = event.slot_id.as_deref();

        match (shelf, slot) {
            (Some(shelf), Some(slot)) => {
                self.known_slots
                    .entry(shelf.to_string())
                    .or_default()
                    .insert(slot.to_string());
            }
            (Some(shelf), None) => {
                self.known_slots.entry(shelf.to_string()).or_default();
            }
            _ => {}
        }

        match Movement::classify(&event.event_type) {
            Movement::Place => {
                if let (Some(shelf), Some(slot)) = (shelf, slot) {
                    self.locations.insert(
                        event.material_id.clone(),
                        (shelf.to_string(), slot.to_string()),
                    );
                }
            }
            Movement::Remove => {
                self.locations.remove(&event.material_id);
            }
            Movement::Other => {}
        }
    }

    /// Rates for every known or configured shelf, sorted by shelf id.
    pub fn finish(self, capacities: &HashMap<String, u32>) -> Vec<ShelfUtilization> {
        let mut occupied: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (shelf, slot) in self.locations.values() {
            occupied.entry(shelf.as_str()).or_default().insert(slot.as_str());
        }

        // Config keys may arrive lowercased, so shelves known only from
        // configuration are reported uppercased.
        let mut shelves: BTreeSet<String> = self.known_slots.keys().cloned().collect();
        for configured in capacities.keys() {
            if !self
                .known_slots
                .keys()
                .any(|known| known.eq_ignore_ascii_case(configured))
            {
                shelves.insert(configured.to_ascii_uppercase());
            }
        }

        shelves
            .into_iter()
            .map(|shelf| {
                let capacity = configured_capacity(capacities, &shelf).unwrap_or_else(|| {
                    self.known_slots
                        .get(&shelf)
                        .map(|slots| slots.len() as u32)
                        .unwrap_or(0)
                });
                let used = occupied.get(shelf.as_str()).map(BTreeSet::len).unwrap_or(0);
                ShelfUtilization {
                    shelf_id: shelf,
                    utilization_rate: rate(used, capacity),
                }
            })
            .collect()
    }
}

fn configured_capacity(capacities: &HashMap<String, u32>, shelf: &str) -> Option<u32> {
    capacities.get(shelf).copied().or_else(|| {
        capacities
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(shelf))
            .map(|(_, capacity)| *capacity)
    })
}

fn rate(used: usize, capacity: u32) -> f64 {
    if capacity == 0 {
        return 0.0;
    }
    (used as f64 / capacity as f64).clamp(0.0, 1.0)
}
