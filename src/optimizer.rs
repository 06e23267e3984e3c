//! Placement logic for assigning unplaced bottles to free grid positions.
//!
//! Two heuristics are implemented:
//! - Capacity balancing: fill the locations with the most free slots first, in order
//! - Affinity scoring: greedily co-locate bottles with the same wine, color and region
//!
//! Both are pure functions of their input. They never touch the store; persisting the
//! resulting assignments is the job of [`crate::service`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::grid::{self, LocationSlots};
use crate::model::{
    BottleId, BottleRecord, LocationId, Position, PositionId, StorageLocation, WineColor,
    WineId, WineSummary,
};
use crate::occupancy::Occupancy;
use crate::registry::BottleRegistry;

/// Points per already stored bottle of the same wine.
pub const WINE_MATCH_WEIGHT: u32 = 10;
/// Points per already stored bottle of the same color.
pub const COLOR_MATCH_WEIGHT: u32 = 5;
/// Points per already stored bottle of the same region (only for wines with a region).
pub const REGION_MATCH_WEIGHT: u32 = 3;

/// Which heuristic a placement run uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// Largest free capacity first, sequential fill.
    Capacity,
    /// Scored grouping by wine, color and region.
    Affinity,
}

impl PlacementStrategy {
    pub fn code(self) -> &'static str {
        match self {
            PlacementStrategy::Capacity => "capacity",
            PlacementStrategy::Affinity => "affinity",
        }
    }
}

impl fmt::Display for PlacementStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PlacementStrategy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "capacity" | "balanced" | "simple" => Ok(PlacementStrategy::Capacity),
            "affinity" | "advanced" | "scored" => Ok(PlacementStrategy::Affinity),
            other => Err(format!("unknown placement strategy '{}'", other)),
        }
    }
}

/// Configuration for placement runs.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlacementConfig {
    /// Strategy used when a request does not name one
    pub default_strategy: PlacementStrategy,
    /// Maximum number of assignment writes in flight at once
    pub persist_concurrency: usize,
}

impl PlacementConfig {
    pub const DEFAULT_STRATEGY: PlacementStrategy = PlacementStrategy::Affinity;
    pub const DEFAULT_PERSIST_CONCURRENCY: usize = 1;
    pub const MAX_PERSIST_CONCURRENCY: usize = 32;

    /// Creates a builder for custom configuration.
    pub fn builder() -> PlacementConfigBuilder {
        PlacementConfigBuilder::default()
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            default_strategy: Self::DEFAULT_STRATEGY,
            persist_concurrency: Self::DEFAULT_PERSIST_CONCURRENCY,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PlacementConfigBuilder {
    config: PlacementConfig,
}

impl PlacementConfigBuilder {
    pub fn default_strategy(mut self, strategy: PlacementStrategy) -> Self {
        self.config.default_strategy = strategy;
        self
    }

    /// Sets the write concurrency, clamped to `1..=MAX_PERSIST_CONCURRENCY`.
    pub fn persist_concurrency(mut self, concurrency: usize) -> Self {
        self.config.persist_concurrency =
            concurrency.clamp(1, PlacementConfig::MAX_PERSIST_CONCURRENCY);
        self
    }

    pub fn build(self) -> PlacementConfig {
        self.config
    }
}

/// One planned placement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Assignment {
    pub bottle_id: BottleId,
    pub position_id: PositionId,
    /// Affinity score at the time of the decision (affinity strategy only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

impl Assignment {
    pub fn new(bottle_id: impl Into<BottleId>, position_id: impl Into<PositionId>) -> Self {
        Self {
            bottle_id: bottle_id.into(),
            position_id: position_id.into(),
            score: None,
        }
    }
}

/// Informational outcome of a run. None of these is an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlacementOutcome {
    /// There were no in-stock bottles without a position.
    NoCandidates,
    /// No free position exists in any location with a grid.
    NoCapacity,
    /// Positions ran out before all bottles were placed.
    Partial { placed: usize, remaining: usize },
    Complete { placed: usize },
}

impl PlacementOutcome {
    fn from_counts(candidates: usize, available: usize, placed: usize) -> Self {
        if candidates == 0 {
            PlacementOutcome::NoCandidates
        } else if available == 0 {
            PlacementOutcome::NoCapacity
        } else if placed < candidates {
            PlacementOutcome::Partial {
                placed,
                remaining: candidates - placed,
            }
        } else {
            PlacementOutcome::Complete { placed }
        }
    }
}

/// Per-location tallies of stored wines, colors and regions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LocationCounters {
    pub wines: HashMap<WineId, u32>,
    pub colors: HashMap<WineColor, u32>,
    pub regions: HashMap<String, u32>,
}

impl LocationCounters {
    pub fn record(&mut self, wine: &WineSummary) {
        *self.wines.entry(wine.id.clone()).or_insert(0) += 1;
        *self.colors.entry(wine.color).or_insert(0) += 1;
        if let Some(region) = wine.region() {
            *self.regions.entry(region.to_string()).or_insert(0) += 1;
        }
    }

    /// Affinity of `wine` to the bottles counted here.
    ///
    /// `10 × same wine + 5 × same color + 3 × same region`, the region term only
    /// when the wine has one.
    pub fn score(&self, wine: &WineSummary) -> u32 {
        let same_wine = self.wines.get(&wine.id).copied().unwrap_or(0);
        let same_color = self.colors.get(&wine.color).copied().unwrap_or(0);
        let same_region = wine
            .region()
            .and_then(|region| self.regions.get(region).copied())
            .unwrap_or(0);
        WINE_MATCH_WEIGHT * same_wine
            + COLOR_MATCH_WEIGHT * same_color
            + REGION_MATCH_WEIGHT * same_region
    }
}

/// Counter snapshot for every location taking part in a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AffinityCounters {
    pub locations: HashMap<LocationId, LocationCounters>,
}

impl AffinityCounters {
    /// Seeds the counters from every placed in-stock bottle with a joined wine.
    pub fn from_registry(registry: &BottleRegistry) -> Self {
        let mut counters = Self::default();
        for (location, record) in registry.all_placed() {
            if let Some(wine) = &record.wine {
                counters.record(location, wine);
            }
        }
        counters
    }

    pub fn record(&mut self, location: &LocationId, wine: &WineSummary) {
        self.locations
            .entry(location.clone())
            .or_default()
            .record(wine);
    }

    /// Score of placing a bottle in `location`; bottles without a wine join score 0.
    pub fn score(&self, location: &LocationId, wine: Option<&WineSummary>) -> u32 {
        match (self.locations.get(location), wine) {
            (Some(counters), Some(wine)) => counters.score(wine),
            _ => 0,
        }
    }

    pub fn location(&self, location: &LocationId) -> Option<&LocationCounters> {
        self.locations.get(location)
    }
}

/// Immutable input of a placement run.
#[derive(Clone, Copy, Debug)]
pub struct PlacementInput<'a> {
    pub registry: &'a BottleRegistry,
    pub locations: &'a [StorageLocation],
    /// All positions of `locations`, occupied or not.
    pub positions: &'a [Position],
}

impl<'a> PlacementInput<'a> {
    pub fn new(
        registry: &'a BottleRegistry,
        locations: &'a [StorageLocation],
        positions: &'a [Position],
    ) -> Self {
        Self {
            registry,
            locations,
            positions,
        }
    }

    /// Free positions grouped per location, in location input order.
    pub fn available_slots(&self) -> Vec<LocationSlots> {
        let occupancy = Occupancy::new(self.registry);
        let occupied: HashSet<PositionId> = self
            .positions
            .iter()
            .filter(|pos| occupancy.is_occupied(&pos.id))
            .map(|pos| pos.id.clone())
            .collect();
        let available = grid::available_positions(self.positions, &occupied);
        grid::group_by_location(self.locations, &available)
            .into_iter()
            .filter(|slots| !slots.is_empty())
            .collect()
    }
}

/// Result of a placement run.
#[derive(Clone, Debug)]
pub struct PlacementResult {
    pub strategy: PlacementStrategy,
    pub assignments: Vec<Assignment>,
    /// Candidates that did not receive a position.
    pub unplaced: Vec<BottleId>,
    pub outcome: PlacementOutcome,
    /// Counters after the run (affinity strategy only).
    pub counters: Option<AffinityCounters>,
}

impl PlacementResult {
    pub fn placed_count(&self) -> usize {
        self.assignments.len()
    }

    pub fn unplaced_count(&self) -> usize {
        self.unplaced.len()
    }
}

/// Events emitted while a run progresses, for live visualization.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum PlacementEvent {
    RunStarted {
        strategy: PlacementStrategy,
        candidates: usize,
        available: usize,
    },
    BottlePlaced {
        bottle_id: BottleId,
        position_id: PositionId,
        location_id: LocationId,
        label: String,
        score: Option<u32>,
    },
    Finished {
        placed: usize,
        unplaced: usize,
    },
}

/// Runs the given strategy without progress reporting.
pub fn plan_placement(strategy: PlacementStrategy, input: PlacementInput<'_>) -> PlacementResult {
    plan_placement_with_progress(strategy, input, |_| {})
}

/// Runs the given strategy and reports every step to `on_event`.
pub fn plan_placement_with_progress(
    strategy: PlacementStrategy,
    input: PlacementInput<'_>,
    on_event: impl FnMut(&PlacementEvent),
) -> PlacementResult {
    match strategy {
        PlacementStrategy::Capacity => place_by_capacity_with_progress(input, on_event),
        PlacementStrategy::Affinity => place_by_affinity_with_progress(input, on_event),
    }
}

pub fn place_by_capacity(input: PlacementInput<'_>) -> PlacementResult {
    place_by_capacity_with_progress(input, |_| {})
}

/// Capacity-balancing placement.
///
/// Locations are sorted by their number of free positions (descending, stable), then
/// bottles are assigned in input order to the next free position, moving on to the next
/// location once one is full. Stops when bottles or positions run out.
pub fn place_by_capacity_with_progress(
    input: PlacementInput<'_>,
    mut on_event: impl FnMut(&PlacementEvent),
) -> PlacementResult {
    let candidates = input.registry.unplaced_bottles();
    let mut groups = input.available_slots();
    let available: usize = groups.iter().map(LocationSlots::len).sum();

    on_event(&PlacementEvent::RunStarted {
        strategy: PlacementStrategy::Capacity,
        candidates: candidates.len(),
        available,
    });

    groups.sort_by(|a, b| b.len().cmp(&a.len()));

    let slots = groups.iter().flat_map(|group| {
        group
            .positions
            .iter()
            .map(move |pos| (&group.location_id, pos))
    });

    let mut assignments = Vec::with_capacity(candidates.len().min(available));
    for (record, (location_id, pos)) in candidates.iter().zip(slots) {
        on_event(&PlacementEvent::BottlePlaced {
            bottle_id: record.bottle.id.clone(),
            position_id: pos.id.clone(),
            location_id: location_id.clone(),
            label: pos.label(),
            score: None,
        });
        assignments.push(Assignment::new(record.bottle.id.clone(), pos.id.clone()));
    }

    let unplaced: Vec<BottleId> = candidates
        .iter()
        .skip(assignments.len())
        .map(|record| record.bottle.id.clone())
        .collect();

    on_event(&PlacementEvent::Finished {
        placed: assignments.len(),
        unplaced: unplaced.len(),
    });

    PlacementResult {
        strategy: PlacementStrategy::Capacity,
        outcome: PlacementOutcome::from_counts(candidates.len(), available, assignments.len()),
        assignments,
        unplaced,
        counters: None,
    }
}

pub fn place_by_affinity(input: PlacementInput<'_>) -> PlacementResult {
    place_by_affinity_with_progress(input, |_| {})
}

/// Affinity-scored placement.
///
/// Every step scores all remaining (bottle, free position) pairs against the counters
/// of the position's location and commits the best one. Ties go to the first pair in
/// iteration order: bottles in input order, then positions in location order, row,
/// column. The counters are updated after each commit so later scores see it.
pub fn place_by_affinity_with_progress(
    input: PlacementInput<'_>,
    mut on_event: impl FnMut(&PlacementEvent),
) -> PlacementResult {
    let candidates = input.registry.unplaced_bottles();
    let mut groups = input.available_slots();
    let available: usize = groups.iter().map(LocationSlots::len).sum();
    let mut counters = AffinityCounters::from_registry(input.registry);

    on_event(&PlacementEvent::RunStarted {
        strategy: PlacementStrategy::Affinity,
        candidates: candidates.len(),
        available,
    });

    // Score depends only on the location, so the best position of a location is
    // always its first free one.
    let mut remaining: Vec<&BottleRecord> = candidates.clone();
    let mut assignments = Vec::with_capacity(candidates.len().min(available));

    while !remaining.is_empty() {
        let mut best: Option<(usize, usize, u32)> = None;
        for (bottle_idx, record) in remaining.iter().enumerate() {
            for (group_idx, group) in groups.iter().enumerate() {
                if group.is_empty() {
                    continue;
                }
                let score = counters.score(&group.location_id, record.wine.as_ref());
                if best.is_none_or(|(_, _, top)| score > top) {
                    best = Some((bottle_idx, group_idx, score));
                }
            }
        }

        let Some((bottle_idx, group_idx, score)) = best else {
            break;
        };

        let record = remaining.remove(bottle_idx);
        let group = &mut groups[group_idx];
        let pos = group.positions.remove(0);
        if let Some(wine) = &record.wine {
            counters.record(&group.location_id, wine);
        }

        log::debug!(
            "Bottle {} -> {} ({}) in {} with score {}",
            record.bottle.id,
            pos.id,
            pos.label(),
            group.location_id,
            score
        );
        on_event(&PlacementEvent::BottlePlaced {
            bottle_id: record.bottle.id.clone(),
            position_id: pos.id.clone(),
            location_id: group.location_id.clone(),
            label: pos.label(),
            score: Some(score),
        });
        assignments.push(Assignment {
            bottle_id: record.bottle.id.clone(),
            position_id: pos.id,
            score: Some(score),
        });
    }

    let unplaced: Vec<BottleId> = remaining
        .iter()
        .map(|record| record.bottle.id.clone())
        .collect();

    on_event(&PlacementEvent::Finished {
        placed: assignments.len(),
        unplaced: unplaced.len(),
    });

    PlacementResult {
        strategy: PlacementStrategy::Affinity,
        outcome: PlacementOutcome::from_counts(candidates.len(), available, assignments.len()),
        assignments,
        unplaced,
        counters: Some(counters),
    }
}
