//! # XVA Engine
//!
//! Monte-Carlo exposure simulation and XVA post-processing.
//!
//! This crate provides:
//! - Portfolio, trade and netting set definitions
//! - Instruments repriced on simulated markets
//! - Valuation calculators writing NPV, close-out and cashflow slots
//! - A valuation engine filling NPV cubes, netting cubes and scenario data
//! - Dynamic initial margin by regression
//! - Exposure profiles and CVA, DVA, FVA, MVA and KVA
//! - [`runner::XvaRunner`], the run orchestrator
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 xva_engine                  │
//! ├─────────────────────────────────────────────┤
//! │  runner/       - XvaRunner (stages)         │
//! │  config/       - XvaRunnerConfig            │
//! │  engine/       - ValuationEngine            │
//! │  calculators/  - NPV, MPOR, cashflows       │
//! │  dim/          - DimCalculator              │
//! │  postprocess/  - PostProcess, XvaReport     │
//! │  xva/          - exposures, adjustments     │
//! │  portfolio/    - Portfolio, Trade           │
//! │  instruments/  - swaps, FX forwards         │
//! └─────────────────────────────────────────────┘
//!          │                     │
//!     xva_models             xva_cube
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xva_engine::prelude::*;
//!
//! # fn main() -> xva_engine::error::Result<()> {
//! let config = XvaRunnerConfig::load("run.toml".as_ref())?;
//! let market = config.todays_market()?;
//! let mut runner = XvaRunner::new(config, Arc::new(Portfolio::new()));
//! runner.prepare(&market, false, None)?;
//! runner.build_cube(None, false)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod calculators;
pub mod config;
pub mod dim;
pub mod engine;
pub mod engine_data;
pub mod error;
pub mod instruments;
pub mod math;
pub mod parallel;
pub mod portfolio;
pub mod postprocess;
pub mod runner;
pub mod xva;

pub use config::{CalculationType, XvaRunnerConfig};
pub use dim::{DimCalculator, DimConfig, DimResults};
pub use engine::{BuiltTrade, NettingTarget, PathFailure, ValuationEngine};
pub use error::{Result, XvaError};
pub use postprocess::{PostProcess, PostProcessor, XvaReport};
pub use runner::{Stage, TradeFailure, XvaRunner};

/// Common imports.
pub mod prelude {
    pub use crate::config::XvaRunnerConfig;
    pub use crate::engine_data::{EngineData, PricingExtension, ReferenceData};
    pub use crate::error::{Result, XvaError};
    pub use crate::instruments::{FxForward, InterestRateSwap};
    pub use crate::portfolio::{Portfolio, Trade, TradeId};
    pub use crate::postprocess::XvaReport;
    pub use crate::runner::{Stage, XvaRunner};
}
