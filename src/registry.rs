//! Working set of bottles for placement runs.
//!
//! The registry is a read view over bottles fetched from the store. Its only
//! mutations are explicit refreshes (`apply_assignments`, `apply_status_change`)
//! so a placement run can be reflected without re-fetching whole collections.

use std::collections::HashMap;

use crate::model::{
    Bottle, BottleId, BottleRecord, LocationId, Position, PositionId,
};
use crate::optimizer::Assignment;

#[derive(Clone, Debug, Default)]
pub struct BottleRegistry {
    records: Vec<BottleRecord>,
    index: HashMap<BottleId, usize>,
    position_locations: HashMap<PositionId, LocationId>,
}

impl BottleRegistry {
    /// Builds a registry from joined bottle records and the known positions.
    ///
    /// Positions are needed to resolve which location a placed bottle sits in.
    pub fn new(records: Vec<BottleRecord>, positions: &[Position]) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.bottle.id.clone(), idx))
            .collect();
        let position_locations = positions
            .iter()
            .map(|pos| (pos.id.clone(), pos.storage_location_id.clone()))
            .collect();
        Self {
            records,
            index,
            position_locations,
        }
    }

    pub fn records(&self) -> &[BottleRecord] {
        &self.records
    }

    pub fn get(&self, id: &BottleId) -> Option<&BottleRecord> {
        self.index.get(id).map(|&idx| &self.records[idx])
    }

    /// Location of a known position.
    pub fn location_of(&self, position_id: &PositionId) -> Option<&LocationId> {
        self.position_locations.get(position_id)
    }

    /// In-stock bottles without a position, in input order.
    pub fn unplaced_bottles(&self) -> Vec<&BottleRecord> {
        self.records
            .iter()
            .filter(|record| record.bottle.status.is_in_stock() && !record.bottle.is_placed())
            .collect()
    }

    /// In-stock bottles whose position belongs to `location_id`.
    pub fn placed_bottles(&self, location_id: &LocationId) -> Vec<&BottleRecord> {
        self.records
            .iter()
            .filter(|record| record.bottle.status.is_in_stock())
            .filter(|record| {
                record
                    .bottle
                    .position_id
                    .as_ref()
                    .and_then(|pos| self.location_of(pos))
                    == Some(location_id)
            })
            .collect()
    }

    /// Every in-stock, placed bottle together with its location.
    pub fn all_placed(&self) -> impl Iterator<Item = (&LocationId, &BottleRecord)> {
        self.records.iter().filter_map(|record| {
            if !record.bottle.status.is_in_stock() {
                return None;
            }
            let pos = record.bottle.position_id.as_ref()?;
            self.location_of(pos).map(|location| (location, record))
        })
    }

    /// Updates the position reference of the assigned bottles only.
    ///
    /// # Returns
    /// Number of records that were changed
    pub fn apply_assignments(&mut self, assignments: &[Assignment]) -> usize {
        let mut changed = 0;
        for assignment in assignments {
            let Some(&idx) = self.index.get(&assignment.bottle_id) else {
                log::warn!(
                    "⚠️ Assignment for unknown bottle {} ignored",
                    assignment.bottle_id
                );
                continue;
            };
            let bottle = &mut self.records[idx].bottle;
            if bottle.position_id.as_ref() != Some(&assignment.position_id) {
                bottle.position_id = Some(assignment.position_id.clone());
                changed += 1;
            }
        }
        changed
    }

    /// Replaces a bottle after a status change (e.g. consumed), keeping its wine join.
    pub fn apply_status_change(&mut self, bottle: Bottle) -> bool {
        match self.index.get(&bottle.id) {
            Some(&idx) => {
                self.records[idx].bottle = bottle;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BottleStatus, Wine, WineColor};

    fn positions() -> Vec<Position> {
        vec![
            Position::new("a1", "A", 1, 1).unwrap(),
            Position::new("a2", "A", 1, 2).unwrap(),
            Position::new("b1", "B", 1, 1).unwrap(),
        ]
    }

    fn record(id: &str, position: Option<&str>, status: BottleStatus) -> BottleRecord {
        let mut bottle = Bottle::new(id, "w1");
        bottle.position_id = position.map(PositionId::from);
        bottle.status = status;
        BottleRecord::new(
            bottle,
            Some(Wine::new("w1", "Rioja", WineColor::Red).summary()),
        )
    }

    fn registry() -> BottleRegistry {
        BottleRegistry::new(
            vec![
                record("u1", None, BottleStatus::InStock),
                record("c1", None, BottleStatus::Consumed),
                record("pa", Some("a1"), BottleStatus::InStock),
                record("pb", Some("b1"), BottleStatus::InStock),
                record("u2", None, BottleStatus::InStock),
            ],
            &positions(),
        )
    }

    #[test]
    fn unplaced_keeps_input_order_and_skips_non_stock() {
        let reg = registry();
        let ids: Vec<&str> = reg
            .unplaced_bottles()
            .iter()
            .map(|r| r.id().as_str())
            .collect();
        assert_eq!(ids, vec!["u1", "u2"]);
    }

    #[test]
    fn placed_bottles_filters_by_location() {
        let reg = registry();
        let in_a: Vec<&str> = reg
            .placed_bottles(&LocationId::from("A"))
            .iter()
            .map(|r| r.id().as_str())
            .collect();
        assert_eq!(in_a, vec!["pa"]);
        assert_eq!(reg.all_placed().count(), 2);
    }

    #[test]
    fn apply_assignments_updates_only_affected_records() {
        let mut reg = registry();
        let changed = reg.apply_assignments(&[
            Assignment::new("u1", "a2"),
            Assignment::new("ghost", "b1"),
        ]);
        assert_eq!(changed, 1);
        assert_eq!(
            reg.get(&BottleId::from("u1")).unwrap().bottle.position_id,
            Some(PositionId::from("a2"))
        );
        assert_eq!(reg.placed_bottles(&LocationId::from("A")).len(), 2);
        assert_eq!(reg.unplaced_bottles().len(), 1);
    }

    #[test]
    fn status_change_frees_the_position() {
        let mut reg = registry();
        let mut bottle = reg.get(&BottleId::from("pa")).unwrap().bottle.clone();
        bottle.mark_lost().unwrap();
        assert!(reg.apply_status_change(bottle));
        assert!(reg.placed_bottles(&LocationId::from("A")).is_empty());
        assert!(
            reg.get(&BottleId::from("pa"))
                .and_then(|record| record.wine.as_ref())
                .is_some()
        );
    }
}
