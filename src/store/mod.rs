//! Data access for the placement core.
//!
//! The optimizers only need a handful of operations from the backing store. They are
//! captured by [`CellarStore`]; `InMemoryStore` backs tests and the demo mode,
//! `RestStore` talks to a hosted PostgREST-style backend.

mod memory;
mod rest;

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    Bottle, BottleId, BottleRecord, BottleStatus, LifecycleError, LocationId, Position,
    PositionId, StorageLocation, ValidationError,
};

pub use memory::InMemoryStore;
pub use rest::{RestStore, RestStoreConfig};

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("position {position_id} is already taken by bottle {occupant}")]
    PositionOccupied {
        position_id: PositionId,
        occupant: BottleId,
    },

    #[error("bottle {0} is not in stock")]
    NotInStock(BottleId),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend responded with {status}: {message}")]
    Backend { status: u16, message: String },
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Filter for `list_bottles`.
///
/// With a `location_id`, only bottles placed inside that location are returned
/// (unplaced bottles have no location and are excluded).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BottleFilter {
    pub status: BottleStatus,
    #[serde(default)]
    pub location_id: Option<LocationId>,
}

impl BottleFilter {
    pub fn in_stock() -> Self {
        Self {
            status: BottleStatus::InStock,
            location_id: None,
        }
    }

    pub fn in_location(mut self, location_id: impl Into<LocationId>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }
}

/// Operations the placement core needs from a persistent store.
pub trait CellarStore: Send + Sync {
    fn list_locations(
        &self,
    ) -> impl Future<Output = Result<Vec<StorageLocation>, StoreError>> + Send;

    /// Positions of one location.
    fn list_positions(
        &self,
        location_id: &LocationId,
    ) -> impl Future<Output = Result<Vec<Position>, StoreError>> + Send;

    /// Bottles joined with their wine's placement traits.
    fn list_bottles(
        &self,
        filter: &BottleFilter,
    ) -> impl Future<Output = Result<Vec<BottleRecord>, StoreError>> + Send;

    fn assign_position(
        &self,
        bottle_id: &BottleId,
        position_id: &PositionId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn clear_position(
        &self,
        bottle_id: &BottleId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Moves an in-stock bottle to a terminal status, freeing its position.
    fn update_status(
        &self,
        bottle_id: &BottleId,
        status: BottleStatus,
        date: Option<NaiveDate>,
    ) -> impl Future<Output = Result<Bottle, StoreError>> + Send;
}

/// The store selected at startup.
#[derive(Clone)]
pub enum StoreBackend {
    InMemory(InMemoryStore),
    Rest(RestStore),
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::InMemory(_) => "in-memory",
            StoreBackend::Rest(_) => "rest",
        }
    }
}

impl CellarStore for StoreBackend {
    async fn list_locations(&self) -> Result<Vec<StorageLocation>, StoreError> {
        match self {
            StoreBackend::InMemory(store) => store.list_locations().await,
            StoreBackend::Rest(store) => store.list_locations().await,
        }
    }

    async fn list_positions(&self, location_id: &LocationId) -> Result<Vec<Position>, StoreError> {
        match self {
            StoreBackend::InMemory(store) => store.list_positions(location_id).await,
            StoreBackend::Rest(store) => store.list_positions(location_id).await,
        }
    }

    async fn list_bottles(&self, filter: &BottleFilter) -> Result<Vec<BottleRecord>, StoreError> {
        match self {
            StoreBackend::InMemory(store) => store.list_bottles(filter).await,
            StoreBackend::Rest(store) => store.list_bottles(filter).await,
        }
    }

    async fn assign_position(
        &self,
        bottle_id: &BottleId,
        position_id: &PositionId,
    ) -> Result<(), StoreError> {
        match self {
            StoreBackend::InMemory(store) => store.assign_position(bottle_id, position_id).await,
            StoreBackend::Rest(store) => store.assign_position(bottle_id, position_id).await,
        }
    }

    async fn clear_position(&self, bottle_id: &BottleId) -> Result<(), StoreError> {
        match self {
            StoreBackend::InMemory(store) => store.clear_position(bottle_id).await,
            StoreBackend::Rest(store) => store.clear_position(bottle_id).await,
        }
    }

    async fn update_status(
        &self,
        bottle_id: &BottleId,
        status: BottleStatus,
        date: Option<NaiveDate>,
    ) -> Result<Bottle, StoreError> {
        match self {
            StoreBackend::InMemory(store) => store.update_status(bottle_id, status, date).await,
            StoreBackend::Rest(store) => store.update_status(bottle_id, status, date).await,
        }
    }
}
