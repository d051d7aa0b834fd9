//! Exposure metrics and valuation adjustments.

mod adjustments;
mod exposure;

pub use adjustments::{
    compute_cva, compute_cva_cs01, compute_dva, compute_fba, compute_fca, compute_kva,
    compute_mva, KvaParams, CS01_BUMP,
};
pub use exposure::{ExposureCalculator, ExposureProfile, DEFAULT_PFE_QUANTILE};
