//! Read-only occupancy queries.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{BottleRecord, LocationId, PositionId, StorageLocation, WineColor};
use crate::registry::BottleRegistry;

/// Occupancy figures of one location.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct LocationSummary {
    pub location_id: LocationId,
    pub name: String,
    pub capacity: Option<u32>,
    pub placed: usize,
    pub available: Option<u32>,
    /// Placed bottles relative to capacity, in percent.
    pub occupancy_rate: f64,
    pub by_color: BTreeMap<String, usize>,
}

/// Lookups over the registry keyed by position.
pub struct Occupancy<'a> {
    registry: &'a BottleRegistry,
    by_position: HashMap<&'a PositionId, &'a BottleRecord>,
}

impl<'a> Occupancy<'a> {
    pub fn new(registry: &'a BottleRegistry) -> Self {
        let by_position = registry
            .records()
            .iter()
            .filter(|record| record.bottle.status.is_in_stock())
            .filter_map(|record| record.bottle.position_id.as_ref().map(|pos| (pos, record)))
            .collect();
        Self {
            registry,
            by_position,
        }
    }

    /// The in-stock bottle stored at `position_id`, if any.
    pub fn bottle_at_position(&self, position_id: &PositionId) -> Option<&'a BottleRecord> {
        self.by_position.get(position_id).copied()
    }

    pub fn is_occupied(&self, position_id: &PositionId) -> bool {
        self.by_position.contains_key(position_id)
    }

    pub fn placed_count(&self, location: &StorageLocation) -> usize {
        self.registry.placed_bottles(&location.id).len()
    }

    /// Placed bottles / capacity as a percentage; 0 without a usable capacity.
    pub fn occupancy_rate(&self, location: &StorageLocation) -> f64 {
        occupancy_rate(self.placed_count(location), location.capacity())
    }

    pub fn location_summary(&self, location: &StorageLocation) -> LocationSummary {
        let placed = self.registry.placed_bottles(&location.id);
        let capacity = location.capacity();
        let mut by_color = BTreeMap::new();
        for record in &placed {
            let key = match &record.wine {
                Some(wine) => color_code(wine.color),
                None => "unknown",
            };
            *by_color.entry(key.to_string()).or_insert(0) += 1;
        }

        LocationSummary {
            location_id: location.id.clone(),
            name: location.name.clone(),
            capacity,
            placed: placed.len(),
            available: capacity.map(|cap| cap.saturating_sub(placed.len() as u32)),
            occupancy_rate: occupancy_rate(placed.len(), capacity),
            by_color,
        }
    }
}

/// Percentage helper that never divides by zero.
pub fn occupancy_rate(placed: usize, capacity: Option<u32>) -> f64 {
    match capacity {
        Some(cap) if cap > 0 => (placed as f64 / cap as f64) * 100.0,
        _ => 0.0,
    }
}

fn color_code(color: WineColor) -> &'static str {
    match color {
        WineColor::Red => "red",
        WineColor::White => "white",
        WineColor::Rose => "rose",
        WineColor::Sparkling => "sparkling",
        WineColor::Fortified => "fortified",
    }
}
