//! InMemoryStore - RwLock-backed cellar store for tests and the demo mode.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;

use super::{BottleFilter, CellarStore, StoreError};
use crate::grid;
use crate::model::{
    Bottle, BottleId, BottleRecord, BottleStatus, LocationId, LocationType, Position,
    PositionId, StorageLocation, ValidationError, Wine, WineColor, WineId,
};

#[derive(Default)]
struct CellarState {
    locations: Vec<StorageLocation>,
    positions: Vec<Position>,
    wines: HashMap<WineId, Wine>,
    bottles: Vec<Bottle>,
}

impl CellarState {
    fn bottle_mut(&mut self, id: &BottleId) -> Result<&mut Bottle, StoreError> {
        self.bottles
            .iter_mut()
            .find(|bottle| &bottle.id == id)
            .ok_or_else(|| StoreError::not_found("bottle", id))
    }

    /// One in-stock bottle per position.
    fn check_claim(
        &self,
        bottle_id: &BottleId,
        position_id: &PositionId,
    ) -> Result<(), StoreError> {
        if !self.positions.iter().any(|pos| &pos.id == position_id) {
            return Err(StoreError::not_found("position", position_id));
        }
        match self.bottles.iter().find(|bottle| {
            bottle.status.is_in_stock()
                && bottle.position_id.as_ref() == Some(position_id)
                && &bottle.id != bottle_id
        }) {
            Some(occupant) => Err(StoreError::PositionOccupied {
                position_id: position_id.clone(),
                occupant: occupant.id.clone(),
            }),
            None => Ok(()),
        }
    }

    fn record(&self, bottle: &Bottle) -> BottleRecord {
        BottleRecord::new(
            bottle.clone(),
            self.wines.get(&bottle.wine_id).map(Wine::summary),
        )
    }
}

/// In-memory store shared via `Arc`; clones see the same cellar.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<CellarState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
        operation: &'static str,
    ) -> Result<RwLockReadGuard<'_, CellarState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::LockPoisoned(operation))
    }

    fn write(
        &self,
        operation: &'static str,
    ) -> Result<RwLockWriteGuard<'_, CellarState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::LockPoisoned(operation))
    }

    /// Adds a location and materializes its grid as `{location}-{row}-{column}` positions.
    pub fn add_location(&self, location: StorageLocation) -> Result<Vec<Position>, StoreError> {
        let positions = grid::generate_positions(&location, |row, column| {
            PositionId::new(format!("{}-{}-{}", location.id, row, column))
        });
        let mut state = self.write("add_location")?;
        state.positions.extend(positions.iter().cloned());
        state.locations.push(location);
        Ok(positions)
    }

    pub fn add_wine(&self, wine: Wine) -> Result<(), StoreError> {
        wine.validate()?;
        self.write("add_wine")?.wines.insert(wine.id.clone(), wine);
        Ok(())
    }

    /// Adds a bottle; a position is only accepted for an in-stock bottle on a free slot.
    pub fn add_bottle(&self, bottle: Bottle) -> Result<(), StoreError> {
        let mut state = self.write("add_bottle")?;
        if let Some(position_id) = &bottle.position_id {
            if !bottle.status.is_in_stock() {
                return Err(ValidationError::InvalidBottle(format!(
                    "bottle {} is {} but still references position {}",
                    bottle.id, bottle.status, position_id
                ))
                .into());
            }
            state.check_claim(&bottle.id, position_id)?;
        }
        state.bottles.push(bottle);
        Ok(())
    }

    /// Writes a position without the claim check, to simulate a store without one.
    #[cfg(test)]
    pub(crate) fn set_position_unchecked(
        &self,
        bottle_id: &BottleId,
        position_id: &PositionId,
    ) -> Result<(), StoreError> {
        self.write("set_position_unchecked")?
            .bottle_mut(bottle_id)?
            .position_id = Some(position_id.clone());
        Ok(())
    }

    pub fn bottle(&self, id: &BottleId) -> Result<Bottle, StoreError> {
        self.read("bottle")?
            .bottles
            .iter()
            .find(|bottle| &bottle.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("bottle", id))
    }

    /// A small cellar to explore the service without a backend.
    pub fn with_demo_cellar() -> Result<Self, StoreError> {
        let store = Self::new();
        let rioja = Wine::new("rioja-reserva", "Rioja Reserva", WineColor::Red)
            .with_region("Rioja")
            .with_vintage(2016);
        let chablis = Wine::new("chablis", "Chablis Premier Cru", WineColor::White)
            .with_region("Bourgogne")
            .with_vintage(2020);
        let douro = Wine::new("douro-tinto", "Douro Tinto", WineColor::Red).with_region("Douro");
        let bordeaux = Wine::new("haut-medoc", "Haut-Médoc", WineColor::Red)
            .with_region("Bordeaux")
            .with_vintage(2015);
        let champagne = Wine::new("brut", "Champagne Brut", WineColor::Sparkling)
            .with_region("Champagne");
        for wine in [rioja, chablis, douro, bordeaux, champagne] {
            store.add_wine(wine)?;
        }

        let locations = [
            StorageLocation::new("cave-a", "Cave A", LocationType::Cellar, Some(2), Some(3))?,
            StorageLocation::new("fridge", "Fridge", LocationType::Fridge, Some(2), Some(4))?,
            StorageLocation::new("side-table", "Side table", LocationType::Other, None, None)?,
        ];
        for location in locations {
            store.add_location(location)?;
        }

        let bottles = [
            Bottle::new("b-1", "rioja-reserva").placed_at("cave-a-1-1"),
            Bottle::new("b-2", "rioja-reserva").placed_at("cave-a-1-2"),
            Bottle::new("b-3", "chablis").placed_at("cave-a-1-3"),
            Bottle::new("b-4", "douro-tinto").placed_at("cave-a-2-1"),
            Bottle::new("b-5", "brut").placed_at("fridge-1-1"),
            Bottle::new("b-6", "rioja-reserva"),
            Bottle::new("b-7", "haut-medoc"),
            Bottle::new("b-8", "brut"),
        ];
        for bottle in bottles {
            store.add_bottle(bottle)?;
        }
        Ok(store)
    }
}

impl CellarStore for InMemoryStore {
    async fn list_locations(&self) -> Result<Vec<StorageLocation>, StoreError> {
        Ok(self.read("list_locations")?.locations.clone())
    }

    async fn list_positions(&self, location_id: &LocationId) -> Result<Vec<Position>, StoreError> {
        let state = self.read("list_positions")?;
        if !state.locations.iter().any(|loc| &loc.id == location_id) {
            return Err(StoreError::not_found("location", location_id));
        }
        Ok(state
            .positions
            .iter()
            .filter(|pos| &pos.storage_location_id == location_id)
            .cloned()
            .collect())
    }

    async fn list_bottles(&self, filter: &BottleFilter) -> Result<Vec<BottleRecord>, StoreError> {
        let state = self.read("list_bottles")?;
        let position_locations: HashMap<&PositionId, &LocationId> = state
            .positions
            .iter()
            .map(|pos| (&pos.id, &pos.storage_location_id))
            .collect();

        Ok(state
            .bottles
            .iter()
            .filter(|bottle| bottle.status == filter.status)
            .filter(|bottle| match &filter.location_id {
                Some(location_id) => bottle
                    .position_id
                    .as_ref()
                    .and_then(|pos| position_locations.get(pos))
                    .is_some_and(|loc| *loc == location_id),
                None => true,
            })
            .map(|bottle| state.record(bottle))
            .collect())
    }

    async fn assign_position(
        &self,
        bottle_id: &BottleId,
        position_id: &PositionId,
    ) -> Result<(), StoreError> {
        let mut state = self.write("assign_position")?;
        state.check_claim(bottle_id, position_id)?;

        let bottle = state.bottle_mut(bottle_id)?;
        if !bottle.status.is_in_stock() {
            return Err(StoreError::NotInStock(bottle_id.clone()));
        }
        bottle.position_id = Some(position_id.clone());
        Ok(())
    }

    async fn clear_position(&self, bottle_id: &BottleId) -> Result<(), StoreError> {
        let mut state = self.write("clear_position")?;
        state.bottle_mut(bottle_id)?.position_id = None;
        Ok(())
    }

    async fn update_status(
        &self,
        bottle_id: &BottleId,
        status: BottleStatus,
        date: Option<NaiveDate>,
    ) -> Result<Bottle, StoreError> {
        let mut state = self.write("update_status")?;
        let bottle = state.bottle_mut(bottle_id)?;
        bottle.transition(status, date)?;
        Ok(bottle.clone())
    }
}
