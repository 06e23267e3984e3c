//! Data models for the cellar placement core.
//!
//! This module defines the records the placement algorithms work on:
//! - `StorageLocation`: a shelf, rack or fridge with an optional row×column grid
//! - `Position`: one addressable (row, column) coordinate inside a location
//! - `Bottle`: a single physical bottle, optionally placed at a position
//! - `Wine` / `WineSummary`: the wine a bottle belongs to and the traits used for scoring
//!
//! Occupancy is never stored on a `Position`; it is derived from the bottles that reference it.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a storage location.
    LocationId
);
string_id!(
    /// Identifier of a grid position.
    PositionId
);
string_id!(
    /// Identifier of a single bottle.
    BottleId
);
string_id!(
    /// Identifier of a wine (shared by all bottles of that wine).
    WineId
);

/// Validation error for incoming records.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("Invalid wine: {0}")]
    InvalidWine(String),
    #[error("Invalid bottle: {0}")]
    InvalidBottle(String),
}

/// Rejected bottle status transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("bottle {id} is already {status} and cannot change status")]
    NotInStock { id: BottleId, status: BottleStatus },
    #[error("bottle {0} cannot be moved back to in_stock")]
    NoReturnToStock(BottleId),
}

fn validate_grid_dimension(value: Option<u32>, name: &str) -> Result<(), ValidationError> {
    match value {
        Some(0) => Err(ValidationError::InvalidGrid(format!(
            "{} must be at least 1 when set",
            name
        ))),
        _ => Ok(()),
    }
}

/// Kind of physical storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Shelf,
    Case,
    Drawer,
    Rack,
    Cellar,
    Fridge,
    Other,
}

/// A place bottles are stored in.
///
/// # Fields
/// * `row_count` / `column_count` - Grid size; the location is only addressable when both are set
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StorageLocation {
    pub id: LocationId,
    pub name: String,
    #[serde(rename = "type")]
    pub location_type: LocationType,
    #[serde(default)]
    pub row_count: Option<u32>,
    #[serde(default)]
    pub column_count: Option<u32>,
}

impl StorageLocation {
    /// Creates a new storage location with validation.
    ///
    /// # Examples
    /// ```
    /// use cellar_sort::model::{LocationType, StorageLocation};
    ///
    /// let rack = StorageLocation::new("loc-1", "Cave A", LocationType::Rack, Some(2), Some(3));
    /// assert_eq!(rack.unwrap().capacity(), Some(6));
    ///
    /// let broken = StorageLocation::new("loc-2", "Broken", LocationType::Shelf, Some(0), Some(3));
    /// assert!(broken.is_err());
    /// ```
    pub fn new(
        id: impl Into<LocationId>,
        name: impl Into<String>,
        location_type: LocationType,
        row_count: Option<u32>,
        column_count: Option<u32>,
    ) -> Result<Self, ValidationError> {
        let location = Self {
            id: id.into(),
            name: name.into(),
            location_type,
            row_count,
            column_count,
        };
        location.validate()?;
        Ok(location)
    }

    /// Re-checks the grid dimensions, e.g. after deserialization.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_grid_dimension(self.row_count, "row_count")?;
        validate_grid_dimension(self.column_count, "column_count")?;
        Ok(())
    }

    /// Number of addressable slots, `None` when the location has no grid.
    pub fn capacity(&self) -> Option<u32> {
        crate::grid::derive_capacity(self)
    }

    pub fn has_grid(&self) -> bool {
        self.capacity().is_some()
    }

    /// Checks whether a coordinate lies inside the declared grid.
    pub fn contains(&self, row: u32, column: u32) -> bool {
        match (self.row_count, self.column_count) {
            (Some(rows), Some(columns)) => {
                (1..=rows).contains(&row) && (1..=columns).contains(&column)
            }
            _ => false,
        }
    }
}

/// One addressable coordinate inside a storage location (1-based).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Position {
    pub id: PositionId,
    pub storage_location_id: LocationId,
    pub row: u32,
    pub column: u32,
}

impl Position {
    /// Creates a position, rejecting zero rows or columns.
    pub fn new(
        id: impl Into<PositionId>,
        storage_location_id: impl Into<LocationId>,
        row: u32,
        column: u32,
    ) -> Result<Self, ValidationError> {
        if row == 0 || column == 0 {
            return Err(ValidationError::InvalidCoordinate(format!(
                "row and column are 1-based, got: ({}, {})",
                row, column
            )));
        }
        Ok(Self {
            id: id.into(),
            storage_location_id: storage_location_id.into(),
            row,
            column,
        })
    }

    /// Spreadsheet-style label: row as letters, column as number.
    ///
    /// ```
    /// use cellar_sort::model::Position;
    ///
    /// let pos = Position::new("p", "loc", 2, 3).unwrap();
    /// assert_eq!(pos.label(), "B3");
    /// let deep = Position::new("p", "loc", 28, 1).unwrap();
    /// assert_eq!(deep.label(), "AB1");
    /// ```
    pub fn label(&self) -> String {
        let mut letters = Vec::new();
        let mut n = self.row;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push(char::from(b'A' + rem as u8));
            n = (n - 1) / 26;
        }
        letters.iter().rev().collect::<String>() + &self.column.to_string()
    }
}

/// Lifecycle status of a bottle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BottleStatus {
    InStock,
    Consumed,
    Gifted,
    Lost,
}

impl BottleStatus {
    pub fn is_in_stock(self) -> bool {
        matches!(self, BottleStatus::InStock)
    }

    pub fn code(self) -> &'static str {
        match self {
            BottleStatus::InStock => "in_stock",
            BottleStatus::Consumed => "consumed",
            BottleStatus::Gifted => "gifted",
            BottleStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for BottleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single physical bottle.
///
/// `position_id` is only ever set while the bottle is in stock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "b-1",
    "wine_id": "w-rioja",
    "position_id": null,
    "status": "in_stock"
}))]
pub struct Bottle {
    pub id: BottleId,
    pub wine_id: WineId,
    #[serde(default)]
    pub position_id: Option<PositionId>,
    pub status: BottleStatus,
    #[serde(default)]
    pub acquired_on: Option<NaiveDate>,
    #[serde(default)]
    pub consumed_on: Option<NaiveDate>,
    #[serde(default)]
    pub tasting_note: Option<String>,
    #[serde(default)]
    pub custom_label: Option<String>,
}

impl Bottle {
    /// Creates an in-stock bottle without a position.
    pub fn new(id: impl Into<BottleId>, wine_id: impl Into<WineId>) -> Self {
        Self {
            id: id.into(),
            wine_id: wine_id.into(),
            position_id: None,
            status: BottleStatus::InStock,
            acquired_on: None,
            consumed_on: None,
            tasting_note: None,
            custom_label: None,
        }
    }

    /// Places the bottle directly at creation time (Builder pattern light).
    pub fn placed_at(mut self, position_id: impl Into<PositionId>) -> Self {
        self.position_id = Some(position_id.into());
        self
    }

    pub fn is_placed(&self) -> bool {
        self.position_id.is_some()
    }

    /// Moves an in-stock bottle into a terminal status and frees its position.
    ///
    /// # Returns
    /// The position that was released, if any
    pub fn transition(
        &mut self,
        status: BottleStatus,
        date: Option<NaiveDate>,
    ) -> Result<Option<PositionId>, LifecycleError> {
        if status.is_in_stock() {
            return Err(LifecycleError::NoReturnToStock(self.id.clone()));
        }
        if !self.status.is_in_stock() {
            return Err(LifecycleError::NotInStock {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = status;
        if status != BottleStatus::Lost {
            self.consumed_on = date;
        }
        Ok(self.position_id.take())
    }

    pub fn consume(&mut self, date: NaiveDate) -> Result<Option<PositionId>, LifecycleError> {
        self.transition(BottleStatus::Consumed, Some(date))
    }

    pub fn gift(&mut self, date: NaiveDate) -> Result<Option<PositionId>, LifecycleError> {
        self.transition(BottleStatus::Gifted, Some(date))
    }

    pub fn mark_lost(&mut self) -> Result<Option<PositionId>, LifecycleError> {
        self.transition(BottleStatus::Lost, None)
    }
}

/// Wine color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WineColor {
    Red,
    White,
    Rose,
    Sparkling,
    Fortified,
}

/// A catalogued wine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Wine {
    pub id: WineId,
    pub name: String,
    pub color: WineColor,
    #[serde(default)]
    pub vintage: Option<u16>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub appellation: Option<String>,
    #[serde(default)]
    pub alcohol_percentage: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Wine {
    pub fn new(id: impl Into<WineId>, name: impl Into<String>, color: WineColor) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color,
            vintage: None,
            domain: None,
            region: None,
            appellation: None,
            alcohol_percentage: None,
            notes: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_vintage(mut self, vintage: u16) -> Self {
        self.vintage = Some(vintage);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(abv) = self.alcohol_percentage {
            if !(0.0..=100.0).contains(&abv) || abv.is_nan() {
                return Err(ValidationError::InvalidWine(format!(
                    "alcohol percentage must be between 0 and 100, got: {}",
                    abv
                )));
            }
        }
        Ok(())
    }

    /// Projects the wine onto the traits the placement scoring needs.
    pub fn summary(&self) -> WineSummary {
        WineSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            color: self.color,
            region: self.region.clone(),
            vintage: self.vintage,
        }
    }
}

/// Wine attributes joined onto a bottle for placement scoring.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WineSummary {
    pub id: WineId,
    pub name: String,
    pub color: WineColor,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub vintage: Option<u16>,
}

impl WineSummary {
    /// Region used for affinity, blank strings count as missing.
    pub fn region(&self) -> Option<&str> {
        self.region
            .as_deref()
            .map(str::trim)
            .filter(|region| !region.is_empty())
    }
}

/// A bottle together with its (optional) joined wine.
///
/// The join may come back empty from the backend; scoring checks it explicitly
/// instead of guessing a color.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BottleRecord {
    #[serde(flatten)]
    pub bottle: Bottle,
    #[serde(default)]
    pub wine: Option<WineSummary>,
}

impl BottleRecord {
    pub fn new(bottle: Bottle, wine: Option<WineSummary>) -> Self {
        Self { bottle, wine }
    }

    pub fn id(&self) -> &BottleId {
        &self.bottle.id
    }
}
