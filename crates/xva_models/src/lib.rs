//! # XVA Models
//!
//! Stochastic model and market layer of the exposure simulation.
//!
//! This crate provides:
//! - Currencies, day counts and tenors
//! - Today's market (flat curves, FX spots, credit and funding curves)
//! - A cross-asset model (Hull-White rates, lognormal FX) and its builder
//! - Date grids with optional close-out dates
//! - Per-sample scenario paths with reproducible seeding
//! - A simulated market advanced scenario by scenario
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              xva_models                 │
//! ├─────────────────────────────────────────┤
//! │  market/      - TodaysMarket            │
//! │  model/       - CrossAssetModel         │
//! │  builder/     - CrossAssetModelBuilder  │
//! │  grid/        - DateGrid                │
//! │  scenario/    - ScenarioGenerator       │
//! │  sim_market/  - ScenarioSimMarket       │
//! └─────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod builder;
pub mod correlation;
pub mod error;
pub mod grid;
pub mod market;
pub mod model;
pub mod rng;
pub mod scenario;
pub mod sim_market;
pub mod types;

pub use builder::{CalibrationFailure, CrossAssetModelBuilder, ModelBuild};
pub use error::{MarketError, ModelError};
pub use grid::{DateGrid, GridPoint, GridPointKind, ScenarioGeneratorData};
pub use market::{CreditCurve, TodaysMarket, TodaysMarketData};
pub use model::{CrossAssetModel, CrossAssetModelData};
pub use scenario::{Scenario, ScenarioGenerator, ScenarioPath};
pub use sim_market::{
    ScenarioProjection, ScenarioSimMarket, SimMarketParameters, SimulatedMarket,
    UnsupportedProjection,
};
pub use types::{Currency, DayCount, Tenor};
