//! Grid helpers for storage locations.
//!
//! A location with both `row_count` and `column_count` set exposes an addressable
//! row×column space. These functions derive capacity, materialize the grid and compute
//! which positions are still free.

use std::collections::{HashMap, HashSet};

use crate::model::{LocationId, Position, PositionId, StorageLocation};

/// Calculates the number of slots of a location.
///
/// # Returns
/// `Some(rows × columns)` when both counts are set, otherwise `None` (no addressable grid)
pub fn derive_capacity(location: &StorageLocation) -> Option<u32> {
    match (location.row_count, location.column_count) {
        (Some(rows), Some(columns)) => Some(rows.saturating_mul(columns)),
        _ => None,
    }
}

/// Returns the positions that are not occupied, ordered by row then column.
///
/// # Parameters
/// * `all_positions` - Every position of one location
/// * `occupied` - IDs of positions currently referenced by an in-stock bottle
pub fn available_positions(
    all_positions: &[Position],
    occupied: &HashSet<PositionId>,
) -> Vec<Position> {
    let mut free: Vec<Position> = all_positions
        .iter()
        .filter(|pos| !occupied.contains(&pos.id))
        .cloned()
        .collect();
    free.sort_by(|a, b| a.row.cmp(&b.row).then_with(|| a.column.cmp(&b.column)));
    free
}

/// Materializes every coordinate of a location's grid in row-major order.
///
/// `make_id` receives `(row, column)` and produces the position ID. Locations
/// without a grid produce no positions.
pub fn generate_positions(
    location: &StorageLocation,
    mut make_id: impl FnMut(u32, u32) -> PositionId,
) -> Vec<Position> {
    let (Some(rows), Some(columns)) = (location.row_count, location.column_count) else {
        return Vec::new();
    };

    let mut positions = Vec::with_capacity(rows as usize * columns as usize);
    for row in 1..=rows {
        for column in 1..=columns {
            positions.push(Position {
                id: make_id(row, column),
                storage_location_id: location.id.clone(),
                row,
                column,
            });
        }
    }
    positions
}

/// Available positions of one location, as consumed by the optimizers.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationSlots {
    pub location_id: LocationId,
    pub positions: Vec<Position>,
}

impl LocationSlots {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Groups available positions per location, keeping the location input order.
///
/// Locations without a grid are skipped entirely, and positions outside the declared
/// grid bounds are dropped. Within a group positions are sorted by row, then column.
pub fn group_by_location(
    locations: &[StorageLocation],
    available: &[Position],
) -> Vec<LocationSlots> {
    let mut by_location: HashMap<&LocationId, Vec<Position>> = HashMap::new();
    for pos in available {
        by_location
            .entry(&pos.storage_location_id)
            .or_default()
            .push(pos.clone());
    }

    let mut groups = Vec::new();
    for location in locations {
        if !location.has_grid() {
            log::debug!(
                "Skipping location '{}' ({}): no row/column grid defined",
                location.name,
                location.id
            );
            continue;
        }
        let Some(mut positions) = by_location.remove(&location.id) else {
            continue;
        };
        positions.retain(|pos| {
            let inside = location.contains(pos.row, pos.column);
            if !inside {
                log::warn!(
                    "⚠️ Position {} ({}) lies outside the {}×{} grid of '{}', ignoring it",
                    pos.id,
                    pos.label(),
                    location.row_count.unwrap_or_default(),
                    location.column_count.unwrap_or_default(),
                    location.name
                );
            }
            inside
        });
        positions.sort_by(|a, b| a.row.cmp(&b.row).then_with(|| a.column.cmp(&b.column)));
        groups.push(LocationSlots {
            location_id: location.id.clone(),
            positions,
        });
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LocationType;

    fn rack(id: &str, rows: Option<u32>, columns: Option<u32>) -> StorageLocation {
        StorageLocation::new(id, id, LocationType::Rack, rows, columns).unwrap()
    }

    fn pos(id: &str, loc: &str, row: u32, column: u32) -> Position {
        Position::new(id, loc, row, column).unwrap()
    }

    #[test]
    fn capacity_requires_both_dimensions() {
        assert_eq!(derive_capacity(&rack("a", Some(2), Some(3))), Some(6));
        assert_eq!(derive_capacity(&rack("a", None, Some(3))), None);
        assert_eq!(derive_capacity(&rack("a", Some(2), None)), None);
        assert_eq!(derive_capacity(&rack("a", None, None)), None);
    }

    #[test]
    fn available_positions_sorted_and_filtered() {
        let all = vec![
            pos("p4", "a", 2, 2),
            pos("p1", "a", 1, 1),
            pos("p3", "a", 2, 1),
            pos("p2", "a", 1, 2),
        ];
        let occupied: HashSet<PositionId> = [PositionId::from("p2")].into_iter().collect();

        let free = available_positions(&all, &occupied);
        let ids: Vec<&str> = free.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p3", "p4"]);
    }

    #[test]
    fn empty_location_yields_no_available_positions() {
        assert!(available_positions(&[], &HashSet::new()).is_empty());
    }

    #[test]
    fn generated_grid_is_row_major() {
        let loc = rack("cave", Some(2), Some(3));
        let positions = generate_positions(&loc, |r, c| PositionId::new(format!("cave-{r}-{c}")));
        assert_eq!(positions.len(), 6);
        assert_eq!(positions[0].id.as_str(), "cave-1-1");
        assert_eq!(positions[3].id.as_str(), "cave-2-1");
        assert!(positions.iter().all(|p| p.storage_location_id == loc.id));

        let no_grid = rack("shelf", None, Some(3));
        assert!(generate_positions(&no_grid, |r, c| PositionId::new(format!("{r}{c}"))).is_empty());
    }

    #[test]
    fn grouping_skips_undefined_grids_and_out_of_bounds() {
        let locations = vec![rack("a", Some(1), Some(2)), rack("b", None, None)];
        let available = vec![
            pos("a2", "a", 1, 2),
            pos("a1", "a", 1, 1),
            pos("a9", "a", 3, 1),
            pos("b1", "b", 1, 1),
        ];

        let groups = group_by_location(&locations, &available);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].location_id.as_str(), "a");
        let ids: Vec<&str> = groups[0].positions.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
    }
}
