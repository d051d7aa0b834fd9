//! # XVA Cube
//!
//! Result stores of the exposure simulation.
//!
//! This crate provides:
//! - Dense single-precision valuation cubes (depth 1 and depth N)
//! - Cube layout and interpretation (regular and close-out lag)
//! - Aggregation scenario data (numeraire, FX spots, short rates)
//! - Trade to netting set aggregation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               xva_cube                  │
//! ├─────────────────────────────────────────┤
//! │  cube/           - SinglePrecisionCube, │
//! │                    SinglePrecisionCubeN │
//! │  interpretation/ - CubeLayout,          │
//! │                    CubeInterpretation   │
//! │  scenario_data/  - AggregationScenario- │
//! │                    Data                 │
//! │  netting/        - NettingAggregator    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use chrono::NaiveDate;
//! use xva_cube::{CubeInterpretation, NpvCube, ValuationCube};
//!
//! let asof = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
//! let dates = vec![NaiveDate::from_ymd_opt(2024, 2, 2).unwrap()];
//! let interp = CubeInterpretation::MporGrid { close_out_lag_days: 14 };
//!
//! let mut cube = ValuationCube::allocate(
//!     asof,
//!     vec!["T1".to_string()],
//!     dates,
//!     100,
//!     interp.layout().depth(),
//!     0.0,
//! )
//! .unwrap();
//! cube.set(0, 0, 42, 1, 3.0).unwrap();
//!
//! assert_eq!(interp.close_out_npv(&cube, 0, 0, 42).unwrap(), 3.0);
//! ```

#![warn(missing_docs)]

pub mod cube;
pub mod error;
pub mod interpretation;
pub mod netting;
pub mod scenario_data;

pub use cube::{
    NpvCube, SampleBlock, SampleBlockMut, SinglePrecisionCube, SinglePrecisionCubeN,
    ValuationCube,
};
pub use error::{CubeAxis, CubeError};
pub use interpretation::{CubeInterpretation, CubeLayout};
pub use netting::{combine_sample, NettingAggregator, NettingRule};
pub use scenario_data::{
    AggregationScenarioData, ScenarioBlockMut, ScenarioDataKey, ScenarioDataType,
};
