//! Placement runs against a store.
//!
//! A run loads a snapshot (locations, positions, in-stock bottles), plans with one of
//! the optimizers, persists the assignments and reflects the successful ones in the
//! snapshot's registry. Persistence is best effort: every assignment is attempted,
//! failures are collected and reported, successful writes stay in place.
//!
//! Runs on one service are serialized; a run holds the run lock from loading the
//! snapshot until its last write has returned.

use chrono::NaiveDate;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use utoipa::ToSchema;

use crate::model::{
    Bottle, BottleId, BottleRecord, BottleStatus, LocationId, Position, PositionId,
    StorageLocation,
};
use crate::occupancy::{LocationSummary, Occupancy};
use crate::optimizer::{
    Assignment, PlacementConfig, PlacementEvent, PlacementInput, PlacementOutcome,
    PlacementStrategy, plan_placement_with_progress,
};
use crate::registry::BottleRegistry;
use crate::store::{BottleFilter, CellarStore, StoreError};

/// Request to run a placement.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[schema(example = json!({ "strategy": "affinity", "dry_run": false }))]
pub struct PlacementRequest {
    /// Falls back to the configured default strategy.
    #[serde(default)]
    #[schema(nullable = true)]
    pub strategy: Option<PlacementStrategy>,
    /// Plan only, do not write anything.
    #[serde(default)]
    pub dry_run: bool,
    /// Restrict the run to these locations.
    #[serde(default)]
    #[schema(nullable = true)]
    pub location_ids: Option<Vec<LocationId>>,
}

/// An assignment whose write was rejected.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct FailedAssignment {
    pub bottle_id: BottleId,
    pub position_id: PositionId,
    pub error: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// Short user-facing summary of a run.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    fn new(level: StatusLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    fn for_run(outcome: PlacementOutcome, placed: usize, failed: usize, dry_run: bool) -> Self {
        match outcome {
            PlacementOutcome::NoCandidates => {
                Self::new(StatusLevel::Info, "No unplaced bottles to place")
            }
            PlacementOutcome::NoCapacity => {
                Self::new(StatusLevel::Info, "No free positions available")
            }
            _ if dry_run => Self::new(
                StatusLevel::Info,
                format!("{} would be placed", bottles(placed)),
            ),
            _ if failed > 0 => Self::new(
                StatusLevel::Error,
                format!("{} placed, {} failed", bottles(placed), failed),
            ),
            PlacementOutcome::Partial { remaining, .. } => Self::new(
                StatusLevel::Success,
                format!(
                    "{} placed, {} still without a position",
                    bottles(placed),
                    remaining
                ),
            ),
            PlacementOutcome::Complete { .. } => {
                Self::new(StatusLevel::Success, format!("{} placed", bottles(placed)))
            }
        }
    }
}

fn bottles(count: usize) -> String {
    match count {
        1 => "1 bottle".to_string(),
        n => format!("{n} bottles"),
    }
}

/// Result of a placement run as reported to callers.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct PlacementReport {
    pub strategy: PlacementStrategy,
    pub dry_run: bool,
    pub outcome: PlacementOutcome,
    /// Persisted assignments (planned ones for a dry run).
    pub assignments: Vec<Assignment>,
    pub failed: Vec<FailedAssignment>,
    /// Candidates the plan could not fit.
    pub unplaced: Vec<BottleId>,
    /// Occupancy of the run's locations afterwards (projected for a dry run).
    pub occupancy: Vec<LocationSummary>,
    pub status: StatusMessage,
}

impl PlacementReport {
    pub fn placed_count(&self) -> usize {
        self.assignments.len()
    }
}

/// Outcome of writing a batch of assignments.
#[derive(Clone, Debug, Default)]
pub struct PersistOutcome {
    pub applied: Vec<Assignment>,
    pub failed: Vec<FailedAssignment>,
}

/// Locations, positions and bottles loaded for one run.
#[derive(Clone, Debug)]
pub struct CellarSnapshot {
    pub locations: Vec<StorageLocation>,
    pub positions: Vec<Position>,
    pub registry: BottleRegistry,
}

impl CellarSnapshot {
    pub fn input(&self) -> PlacementInput<'_> {
        PlacementInput::new(&self.registry, &self.locations, &self.positions)
    }

    pub fn summaries(&self) -> Vec<LocationSummary> {
        let occupancy = Occupancy::new(&self.registry);
        self.locations
            .iter()
            .map(|location| occupancy.location_summary(location))
            .collect()
    }
}

pub struct PlacementService<S> {
    store: S,
    config: PlacementConfig,
    run_lock: Mutex<()>,
}

impl<S: CellarStore> PlacementService<S> {
    pub fn new(store: S, config: PlacementConfig) -> Self {
        Self {
            store,
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Loads locations (optionally restricted), their positions and all in-stock bottles.
    pub async fn load_snapshot(
        &self,
        location_ids: Option<&[LocationId]>,
    ) -> Result<CellarSnapshot, StoreError> {
        let mut locations = self.store.list_locations().await?;
        if let Some(ids) = location_ids {
            if let Some(missing) = ids
                .iter()
                .find(|id| !locations.iter().any(|loc| &loc.id == *id))
            {
                return Err(StoreError::not_found("location", missing));
            }
            locations.retain(|loc| ids.contains(&loc.id));
        }

        let mut positions = Vec::new();
        for location in &locations {
            positions.extend(self.store.list_positions(&location.id).await?);
        }
        let bottles = self.store.list_bottles(&BottleFilter::in_stock()).await?;
        let registry = BottleRegistry::new(bottles, &positions);

        Ok(CellarSnapshot {
            locations,
            positions,
            registry,
        })
    }

    pub async fn optimize(&self, request: PlacementRequest) -> Result<PlacementReport, StoreError> {
        self.optimize_with_progress(request, |_| {}).await
    }

    /// Plans, persists and reports a placement run.
    pub async fn optimize_with_progress(
        &self,
        request: PlacementRequest,
        on_event: impl FnMut(&PlacementEvent) + Send,
    ) -> Result<PlacementReport, StoreError> {
        let strategy = request.strategy.unwrap_or(self.config.default_strategy);
        let _run = self.run_lock.lock().await;
        let mut snapshot = self.load_snapshot(request.location_ids.as_deref()).await?;
        let result = plan_placement_with_progress(strategy, snapshot.input(), on_event);

        let outcome = if request.dry_run {
            PersistOutcome {
                applied: result.assignments.clone(),
                failed: Vec::new(),
            }
        } else {
            self.persist(&result.assignments).await
        };
        snapshot.registry.apply_assignments(&outcome.applied);

        let status = StatusMessage::for_run(
            result.outcome,
            outcome.applied.len(),
            outcome.failed.len(),
            request.dry_run,
        );
        log::info!(
            "📦 Placement ({}{}): {} placed, {} failed, {} without position",
            strategy,
            if request.dry_run { ", dry run" } else { "" },
            outcome.applied.len(),
            outcome.failed.len(),
            result.unplaced_count()
        );

        Ok(PlacementReport {
            strategy,
            dry_run: request.dry_run,
            outcome: result.outcome,
            assignments: outcome.applied,
            failed: outcome.failed,
            unplaced: result.unplaced,
            occupancy: snapshot.summaries(),
            status,
        })
    }

    /// Writes every assignment, up to `persist_concurrency` at a time.
    ///
    /// Failures never stop the batch; results keep the input order.
    pub async fn persist(&self, assignments: &[Assignment]) -> PersistOutcome {
        let store = &self.store;
        let writes = assignments.iter().cloned().map(|assignment| async move {
            let result = store
                .assign_position(&assignment.bottle_id, &assignment.position_id)
                .await;
            (assignment, result)
        });
        let results: Vec<(Assignment, Result<(), StoreError>)> = futures::stream::iter(writes)
            .buffered(self.config.persist_concurrency.max(1))
            .collect()
            .await;

        let mut outcome = PersistOutcome::default();
        for (assignment, result) in results {
            match result {
                Ok(()) => {
                    log::debug!(
                        "Bottle {} placed at {}",
                        assignment.bottle_id,
                        assignment.position_id
                    );
                    outcome.applied.push(assignment);
                }
                Err(err) => {
                    log::warn!(
                        "⚠️ Could not place bottle {} at {}: {}",
                        assignment.bottle_id,
                        assignment.position_id,
                        err
                    );
                    outcome.failed.push(FailedAssignment {
                        bottle_id: assignment.bottle_id,
                        position_id: assignment.position_id,
                        error: err.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// Consumes, gifts or loses a bottle; its position becomes free.
    pub async fn change_status(
        &self,
        bottle_id: &BottleId,
        status: BottleStatus,
        date: Option<NaiveDate>,
    ) -> Result<Bottle, StoreError> {
        let bottle = self.store.update_status(bottle_id, status, date).await?;
        log::info!("🍷 Bottle {} is now {}", bottle.id, bottle.status);
        Ok(bottle)
    }

    /// Takes a bottle out of its position; it stays in stock.
    pub async fn unplace_bottle(&self, bottle_id: &BottleId) -> Result<(), StoreError> {
        self.store.clear_position(bottle_id).await?;
        log::info!("📤 Bottle {} removed from its position", bottle_id);
        Ok(())
    }

    pub async fn bottle_at_position(
        &self,
        position_id: &PositionId,
    ) -> Result<Option<BottleRecord>, StoreError> {
        let bottles = self.store.list_bottles(&BottleFilter::in_stock()).await?;
        let registry = BottleRegistry::new(bottles, &[]);
        Ok(Occupancy::new(&registry)
            .bottle_at_position(position_id)
            .cloned())
    }

    pub async fn location_summaries(&self) -> Result<Vec<LocationSummary>, StoreError> {
        Ok(self.load_snapshot(None).await?.summaries())
    }

    pub async fn location_summary(
        &self,
        location_id: &LocationId,
    ) -> Result<LocationSummary, StoreError> {
        let location = self
            .store
            .list_locations()
            .await?
            .into_iter()
            .find(|location| &location.id == location_id)
            .ok_or_else(|| StoreError::not_found("location", location_id))?;
        let positions = self.store.list_positions(location_id).await?;
        let placed = self
            .store
            .list_bottles(&BottleFilter::in_stock().in_location(location_id.clone()))
            .await?;
        let registry = BottleRegistry::new(placed, &positions);
        Ok(Occupancy::new(&registry).location_summary(&location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LocationType, Wine, WineColor};
    use crate::store::InMemoryStore;
    use std::collections::HashSet;

    /// Delegates to an in-memory store but rejects writes for selected bottles.
    struct FlakyStore {
        inner: InMemoryStore,
        failing: HashSet<BottleId>,
    }

    impl CellarStore for FlakyStore {
        async fn list_locations(&self) -> Result<Vec<StorageLocation>, StoreError> {
            self.inner.list_locations().await
        }

        async fn list_positions(
            &self,
            location_id: &LocationId,
        ) -> Result<Vec<Position>, StoreError> {
            self.inner.list_positions(location_id).await
        }

        async fn list_bottles(
            &self,
            filter: &BottleFilter,
        ) -> Result<Vec<BottleRecord>, StoreError> {
            self.inner.list_bottles(filter).await
        }

        async fn assign_position(
            &self,
            bottle_id: &BottleId,
            position_id: &PositionId,
        ) -> Result<(), StoreError> {
            if self.failing.contains(bottle_id) {
                return Err(StoreError::Backend {
                    status: 503,
                    message: "write rejected".to_string(),
                });
            }
            self.inner.assign_position(bottle_id, position_id).await
        }

        async fn clear_position(&self, bottle_id: &BottleId) -> Result<(), StoreError> {
            self.inner.clear_position(bottle_id).await
        }

        async fn update_status(
            &self,
            bottle_id: &BottleId,
            status: BottleStatus,
            date: Option<NaiveDate>,
        ) -> Result<Bottle, StoreError> {
            self.inner.update_status(bottle_id, status, date).await
        }
    }

    /// Checks the claim, yields, then writes: a store without an atomic claim.
    struct RacyStore {
        inner: InMemoryStore,
    }

    impl CellarStore for RacyStore {
        async fn list_locations(&self) -> Result<Vec<StorageLocation>, StoreError> {
            self.inner.list_locations().await
        }

        async fn list_positions(
            &self,
            location_id: &LocationId,
        ) -> Result<Vec<Position>, StoreError> {
            self.inner.list_positions(location_id).await
        }

        async fn list_bottles(
            &self,
            filter: &BottleFilter,
        ) -> Result<Vec<BottleRecord>, StoreError> {
            self.inner.list_bottles(filter).await
        }

        async fn assign_position(
            &self,
            bottle_id: &BottleId,
            position_id: &PositionId,
        ) -> Result<(), StoreError> {
            let bottles = self.inner.list_bottles(&BottleFilter::in_stock()).await?;
            if let Some(occupant) = bottles.iter().find(|record| {
                record.bottle.position_id.as_ref() == Some(position_id)
                    && &record.bottle.id != bottle_id
            }) {
                return Err(StoreError::PositionOccupied {
                    position_id: position_id.clone(),
                    occupant: occupant.id().clone(),
                });
            }
            tokio::task::yield_now().await;
            self.inner.set_position_unchecked(bottle_id, position_id)
        }

        async fn clear_position(&self, bottle_id: &BottleId) -> Result<(), StoreError> {
            self.inner.clear_position(bottle_id).await
        }

        async fn update_status(
            &self,
            bottle_id: &BottleId,
            status: BottleStatus,
            date: Option<NaiveDate>,
        ) -> Result<Bottle, StoreError> {
            self.inner.update_status(bottle_id, status, date).await
        }
    }

    fn cave_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .add_location(
                StorageLocation::new("cave", "Cave A", LocationType::Cellar, Some(2), Some(3))
                    .unwrap(),
            )
            .unwrap();
        store
            .add_wine(Wine::new("X", "Rioja", WineColor::Red).with_region("Rioja"))
            .unwrap();
        store
            .add_wine(Wine::new("Y", "Riesling", WineColor::White).with_region("Alsace"))
            .unwrap();
        store
            .add_wine(Wine::new("W", "Médoc", WineColor::Red).with_region("Bordeaux"))
            .unwrap();
        for (id, wine, pos) in [
            ("x1", "X", "cave-1-1"),
            ("x2", "X", "cave-1-2"),
            ("y1", "Y", "cave-1-3"),
        ] {
            store.add_bottle(Bottle::new(id, wine).placed_at(pos)).unwrap();
        }
        store.add_bottle(Bottle::new("new-w", "W")).unwrap();
        store.add_bottle(Bottle::new("new-x", "X")).unwrap();
        store
    }

    #[tokio::test]
    async fn affinity_run_persists_and_reports() {
        let store = cave_store();
        let service = PlacementService::new(store.clone(), PlacementConfig::default());

        let report = service.optimize(PlacementRequest::default()).await.unwrap();
        assert_eq!(report.strategy, PlacementStrategy::Affinity);
        assert_eq!(report.placed_count(), 2);
        assert_eq!(report.assignments[0].bottle_id.as_str(), "new-x");
        assert_eq!(report.status.level, StatusLevel::Success);
        assert_eq!(report.status.text, "2 bottles placed");

        let placed = store.bottle(&BottleId::from("new-x")).unwrap();
        assert_eq!(placed.position_id, Some(PositionId::from("cave-2-1")));

        // The report reflects the registry after the run.
        assert_eq!(report.occupancy.len(), 1);
        assert_eq!(report.occupancy[0].placed, 5);
        assert_eq!(report.occupancy[0].available, Some(1));

        // Re-running finds nothing left to do.
        let again = service.optimize(PlacementRequest::default()).await.unwrap();
        assert_eq!(again.placed_count(), 0);
        assert_eq!(again.outcome, PlacementOutcome::NoCandidates);
        assert_eq!(again.status.level, StatusLevel::Info);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let store = cave_store();
        let service = PlacementService::new(store.clone(), PlacementConfig::default());
        let report = service
            .optimize(PlacementRequest {
                strategy: Some(PlacementStrategy::Capacity),
                dry_run: true,
                location_ids: None,
            })
            .await
            .unwrap();
        assert_eq!(report.placed_count(), 2);
        assert!(report.dry_run);
        assert_eq!(report.status.text, "2 bottles would be placed");
        assert_eq!(report.occupancy[0].placed, 5);
        assert!(!store.bottle(&BottleId::from("new-x")).unwrap().is_placed());
    }

    #[tokio::test]
    async fn persistence_is_best_effort() {
        let inner = cave_store();
        inner.add_bottle(Bottle::new("new-y", "Y")).unwrap();
        let store = FlakyStore {
            inner: inner.clone(),
            failing: [BottleId::from("new-x")].into_iter().collect(),
        };
        let service = PlacementService::new(store, PlacementConfig::default());

        let report = service
            .optimize(PlacementRequest {
                strategy: Some(PlacementStrategy::Capacity),
                ..Default::default()
            })
            .await
            .unwrap();

        // new-x sits between new-w and new-y; the writes around it still land.
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].bottle_id.as_str(), "new-x");
        let applied: Vec<&str> = report
            .assignments
            .iter()
            .map(|a| a.bottle_id.as_str())
            .collect();
        assert_eq!(applied, vec!["new-w", "new-y"]);
        assert_eq!(report.status.level, StatusLevel::Error);
        assert_eq!(report.status.text, "2 bottles placed, 1 failed");

        assert!(inner.bottle(&BottleId::from("new-w")).unwrap().is_placed());
        assert!(inner.bottle(&BottleId::from("new-y")).unwrap().is_placed());
        assert!(!inner.bottle(&BottleId::from("new-x")).unwrap().is_placed());
    }

    #[tokio::test]
    async fn affinity_failures_keep_other_writes() {
        let inner = cave_store();
        let store = FlakyStore {
            inner: inner.clone(),
            failing: [BottleId::from("new-x")].into_iter().collect(),
        };
        let service = PlacementService::new(store, PlacementConfig::default());

        let report = service
            .optimize(PlacementRequest {
                strategy: Some(PlacementStrategy::Affinity),
                ..Default::default()
            })
            .await
            .unwrap();

        // new-x is planned first (identity match) and fails; new-w is still written.
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].bottle_id.as_str(), "new-x");
        assert_eq!(report.failed[0].position_id.as_str(), "cave-2-1");
        assert_eq!(report.assignments.len(), 1);
        assert_eq!(report.assignments[0].bottle_id.as_str(), "new-w");
        assert_eq!(report.status.level, StatusLevel::Error);
        assert_eq!(report.status.text, "1 bottle placed, 1 failed");
        assert_eq!(report.occupancy[0].placed, 4);

        assert_eq!(
            inner.bottle(&BottleId::from("new-w")).unwrap().position_id,
            Some(PositionId::from("cave-2-2"))
        );
        assert!(!inner.bottle(&BottleId::from("new-x")).unwrap().is_placed());
    }

    #[tokio::test]
    async fn overlapping_runs_never_share_a_position() {
        let inner = InMemoryStore::new();
        inner
            .add_location(
                StorageLocation::new("rack", "Rack", LocationType::Rack, Some(1), Some(2))
                    .unwrap(),
            )
            .unwrap();
        inner
            .add_wine(Wine::new("X", "Rioja", WineColor::Red).with_region("Rioja"))
            .unwrap();
        inner
            .add_wine(Wine::new("Y", "Riesling", WineColor::White).with_region("Alsace"))
            .unwrap();
        inner
            .add_bottle(Bottle::new("x1", "X").placed_at("rack-1-1"))
            .unwrap();
        inner.add_bottle(Bottle::new("new-y", "Y")).unwrap();
        inner.add_bottle(Bottle::new("new-x", "X")).unwrap();

        let service = PlacementService::new(
            RacyStore {
                inner: inner.clone(),
            },
            PlacementConfig::default(),
        );
        // Capacity picks new-y for the last slot, affinity picks new-x.
        let (first, second) = tokio::join!(
            service.optimize(PlacementRequest {
                strategy: Some(PlacementStrategy::Capacity),
                ..Default::default()
            }),
            service.optimize(PlacementRequest {
                strategy: Some(PlacementStrategy::Affinity),
                ..Default::default()
            })
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.placed_count() + second.placed_count(), 1);
        assert!(first.failed.is_empty() && second.failed.is_empty());
        assert_eq!(second.outcome, PlacementOutcome::NoCapacity);

        let at_slot = inner
            .list_bottles(&BottleFilter::in_stock())
            .await
            .unwrap()
            .into_iter()
            .filter(|record| record.bottle.position_id == Some(PositionId::from("rack-1-2")))
            .count();
        assert_eq!(at_slot, 1);
    }

    #[tokio::test]
    async fn concurrent_persistence_keeps_order() {
        let store = cave_store();
        let config = PlacementConfig::builder().persist_concurrency(4).build();
        let service = PlacementService::new(store, config);
        let assignments = vec![
            Assignment::new("new-w", "cave-2-2"),
            Assignment::new("new-x", "cave-1-1"),
            Assignment::new("new-x", "cave-2-3"),
        ];
        let outcome = service.persist(&assignments).await;
        let applied: Vec<&str> = outcome
            .applied
            .iter()
            .map(|a| a.position_id.as_str())
            .collect();
        assert_eq!(applied, vec!["cave-2-2", "cave-2-3"]);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].error.contains("already taken"));
    }

    #[tokio::test]
    async fn consuming_frees_position_for_next_run() {
        let store = cave_store();
        store.add_bottle(Bottle::new("n1", "Y")).unwrap();
        store.add_bottle(Bottle::new("n2", "Y")).unwrap();
        let service = PlacementService::new(store.clone(), PlacementConfig::default());

        let first = service.optimize(PlacementRequest::default()).await.unwrap();
        assert_eq!(first.placed_count(), 3);
        assert_eq!(first.unplaced.len(), 1);

        let date = NaiveDate::from_ymd_opt(2025, 12, 24).unwrap();
        let consumed = service
            .change_status(&BottleId::from("x1"), BottleStatus::Consumed, Some(date))
            .await
            .unwrap();
        assert_eq!(consumed.position_id, None);
        assert!(
            service
                .bottle_at_position(&PositionId::from("cave-1-1"))
                .await
                .unwrap()
                .is_none()
        );

        let second = service.optimize(PlacementRequest::default()).await.unwrap();
        assert_eq!(second.placed_count(), 1);
        assert_eq!(second.assignments[0].position_id.as_str(), "cave-1-1");
    }

    #[tokio::test]
    async fn unplaced_bottle_is_candidate_again() {
        let store = cave_store();
        let service = PlacementService::new(store.clone(), PlacementConfig::default());
        service.unplace_bottle(&BottleId::from("y1")).await.unwrap();
        assert!(!store.bottle(&BottleId::from("y1")).unwrap().is_placed());

        let report = service.optimize(PlacementRequest::default()).await.unwrap();
        assert_eq!(report.placed_count(), 3);
        assert_eq!(report.outcome, PlacementOutcome::Complete { placed: 3 });
    }

    #[tokio::test]
    async fn summaries_and_unknown_locations() {
        let service = PlacementService::new(cave_store(), PlacementConfig::default());
        let summary = service
            .location_summary(&LocationId::from("cave"))
            .await
            .unwrap();
        assert_eq!(summary.placed, 3);
        assert_eq!(summary.capacity, Some(6));
        assert!(matches!(
            service.location_summary(&LocationId::from("attic")).await,
            Err(StoreError::NotFound { kind: "location", .. })
        ));

        let found = service
            .bottle_at_position(&PositionId::from("cave-1-3"))
            .await
            .unwrap();
        assert_eq!(found.map(|record| record.bottle.id), Some(BottleId::from("y1")));
        assert!((summary.occupancy_rate - 50.0).abs() < 1e-9);

        let err = service
            .optimize(PlacementRequest {
                location_ids: Some(vec![LocationId::from("attic")]),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "location", .. }));
    }
}
