//! Automatic bottle placement for a wine cellar.
//!
//! Storage locations expose grids of positions; the optimizers assign unplaced in-stock
//! bottles to free positions, either by spreading over the roomiest locations or by
//! grouping bottles next to similar wines.

pub mod api;
pub mod config;
pub mod grid;
pub mod model;
pub mod occupancy;
pub mod optimizer;
pub mod registry;
pub mod service;
pub mod store;
