//! Run configuration.
//!
//! [`XvaRunnerConfig`] is deserialised from TOML. Every section except the
//! as-of date and base currency has a default, so a minimal file only names
//! the market, model, grid and engines it needs.
//!
//! ```toml
//! asof = "2024-01-02"
//! base_currency = "USD"
//! dim_quantile = 0.99
//!
//! [analytics]
//! dim = true
//! kva = true
//!
//! [scenario_generator]
//! grid = ["6M", "1Y", "2Y"]
//! samples = 1000
//! close_out_lag_days = 14
//!
//! [engine_data]
//! InterestRateSwap = "DiscountedCashflows"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;
use xva_cube::{CubeInterpretation, ScenarioDataKey};
use xva_models::{
    CrossAssetModelData, Currency, DayCount, ScenarioGeneratorData, SimMarketParameters,
    TodaysMarket, TodaysMarketData,
};

use crate::dim::DimConfig;
use crate::engine_data::{EngineData, ReferenceData};
use crate::error::{Result, XvaError};
use crate::parallel::ParallelConfig;
use crate::portfolio::NettingSetDefinitions;
use crate::postprocess::{AnalyticsFlags, PostProcessSettings};
use crate::xva::{KvaParams, DEFAULT_PFE_QUANTILE};

/// Recognised keys of the analytics map.
pub const ANALYTICS_KEYS: [&str; 4] = ["dim", "mva", "kva", "cvaSensi"];

/// How close-out values are obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalculationType {
    /// Close-out value read from the next valuation date.
    #[default]
    Regular,
    /// Close-out value simulated on a lagged close-out grid.
    NoLag,
}

fn default_day_count() -> DayCount {
    DayCount::Act365F
}

/// Market conventions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conventions {
    /// Day count for model and exposure times.
    #[serde(default = "default_day_count")]
    pub day_count: DayCount,
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            day_count: default_day_count(),
        }
    }
}

fn default_dim_quantile() -> f64 {
    0.99
}

fn default_dim_horizon() -> u32 {
    14
}

fn default_bandwidth() -> f64 {
    0.25
}

fn default_pfe_quantile() -> f64 {
    DEFAULT_PFE_QUANTILE
}

fn default_true() -> bool {
    true
}

/// Configuration of an XVA run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct XvaRunnerConfig {
    /// Valuation date.
    pub asof: NaiveDate,
    /// Reporting and numeraire currency.
    pub base_currency: Currency,
    /// Conventions.
    #[serde(default)]
    pub conventions: Conventions,
    /// Today's curves, spots, credit and funding curves.
    #[serde(default)]
    pub market: TodaysMarketData,
    /// Netting agreements.
    #[serde(default)]
    pub netting_sets: NettingSetDefinitions,
    /// Pricing engine per product type.
    #[serde(default)]
    pub engine_data: EngineData,
    /// Simulated currencies.
    #[serde(default)]
    pub sim_market: SimMarketParameters,
    /// Grid, samples, seed and close-out lag.
    #[serde(default)]
    pub scenario_generator: ScenarioGeneratorData,
    /// Cross-asset model parameters.
    #[serde(default)]
    pub model: CrossAssetModelData,
    /// Opaque reference data for pricing.
    #[serde(default)]
    pub reference_data: ReferenceData,
    /// DIM quantile in (0, 1).
    #[serde(default = "default_dim_quantile")]
    pub dim_quantile: f64,
    /// DIM margin period of risk in calendar days.
    #[serde(default = "default_dim_horizon")]
    pub dim_horizon_calendar_days: u32,
    /// DIM regression order; 0 uses the empirical quantile.
    #[serde(default)]
    pub dim_regression_order: usize,
    /// DIM regressors such as `FXSpot/EUR`; empty uses the netting set NPV.
    #[serde(default)]
    pub dim_regressors: Vec<String>,
    /// Local regression evaluation points.
    #[serde(default)]
    pub dim_local_regression_evaluations: usize,
    /// Local regression bandwidth in regressor standard deviations.
    #[serde(default = "default_bandwidth")]
    pub dim_local_regression_bandwidth: f64,
    /// Analytics switches (`dim`, `mva`, `kva`, `cvaSensi`).
    #[serde(default)]
    pub analytics: BTreeMap<String, bool>,
    /// Close-out treatment.
    #[serde(default)]
    pub calculation_type: CalculationType,
    /// Own credit curve for DVA.
    #[serde(default)]
    pub dva_name: Option<String>,
    /// Borrowing spread curve.
    #[serde(default)]
    pub fva_borrowing_curve: Option<String>,
    /// Lending spread curve.
    #[serde(default)]
    pub fva_lending_curve: Option<String>,
    /// Deduct DIM from positive exposure.
    #[serde(default)]
    pub full_initial_collateralisation: bool,
    /// Store cash flows in the cube (regular grids only).
    #[serde(default)]
    pub store_flows: bool,
    /// Aggregate netting sets inside the sample loop.
    #[serde(default = "default_true")]
    pub inline_netting: bool,
    /// PFE confidence level.
    #[serde(default = "default_pfe_quantile")]
    pub pfe_quantile: f64,
    /// KVA capital proxy.
    #[serde(default)]
    pub kva: KvaParams,
    /// Parallel execution.
    #[serde(default)]
    pub parallel: ParallelConfig,
}

impl XvaRunnerConfig {
    /// Minimal configuration with every default.
    pub fn new(asof: NaiveDate, base_currency: Currency) -> Self {
        Self {
            asof,
            base_currency,
            conventions: Conventions::default(),
            market: TodaysMarketData::default(),
            netting_sets: NettingSetDefinitions::default(),
            engine_data: EngineData::default(),
            sim_market: SimMarketParameters::default(),
            scenario_generator: ScenarioGeneratorData::default(),
            model: CrossAssetModelData::default(),
            reference_data: ReferenceData::default(),
            dim_quantile: default_dim_quantile(),
            dim_horizon_calendar_days: default_dim_horizon(),
            dim_regression_order: 0,
            dim_regressors: Vec::new(),
            dim_local_regression_evaluations: 0,
            dim_local_regression_bandwidth: default_bandwidth(),
            analytics: BTreeMap::new(),
            calculation_type: CalculationType::default(),
            dva_name: None,
            fva_borrowing_curve: None,
            fva_lending_curve: None,
            full_initial_collateralisation: false,
            store_flows: false,
            inline_netting: true,
            pfe_quantile: default_pfe_quantile(),
            kva: KvaParams::default(),
            parallel: ParallelConfig::default(),
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| XvaError::configuration(format!("parse: {}", e)))
    }

    /// Loads a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| XvaError::configuration(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Checks the configuration, reporting every problem at once.
    ///
    /// # Errors
    ///
    /// `XvaError::Configuration` with the problems joined by `"; "`.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if !(self.dim_quantile > 0.0 && self.dim_quantile < 1.0) {
            errors.push(format!("dim_quantile {} must lie in (0, 1)", self.dim_quantile));
        }
        if !(self.pfe_quantile > 0.0 && self.pfe_quantile < 1.0) {
            errors.push(format!("pfe_quantile {} must lie in (0, 1)", self.pfe_quantile));
        }
        if self.scenario_generator.samples == 0 {
            errors.push("scenario_generator.samples must be greater than 0".to_string());
        }
        if self.scenario_generator.grid.is_empty() {
            errors.push("scenario_generator.grid must not be empty".to_string());
        }
        if let Some(lag) = self.scenario_generator.close_out_lag_days {
            if lag <= 0 {
                errors.push(format!("close_out_lag_days {} must be positive", lag));
            }
        }
        if self.parallel.batch_size == 0 {
            errors.push("parallel.batch_size must be greater than 0".to_string());
        }
        if !self.model.ir.is_empty() && !self.model.currencies().contains(&self.base_currency) {
            errors.push(format!(
                "base currency {} has no rate model",
                self.base_currency
            ));
        }
        for regressor in &self.dim_regressors {
            if regressor.parse::<ScenarioDataKey>().is_err() {
                errors.push(format!("unknown DIM regressor '{}'", regressor));
            }
        }
        for key in self.analytics.keys() {
            if !ANALYTICS_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key)) {
                warn!(analytic = %key, valid = ?ANALYTICS_KEYS, "ignoring unknown analytic");
            }
        }
        if let Err(e) = self.netting_sets.validate() {
            errors.push(e.to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(XvaError::configuration(errors.join("; ")))
        }
    }

    /// Analytics switches with defaults for missing keys.
    ///
    /// An empty map falls back to the defaults with a warning; keys are
    /// matched case-insensitively.
    pub fn analytics(&self) -> AnalyticsFlags {
        let defaults = AnalyticsFlags::default();
        if self.analytics.is_empty() {
            warn!("no analytics configured, using defaults");
            return defaults;
        }
        let lookup = |name: &str, default: bool| {
            self.analytics
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| *v)
                .unwrap_or(default)
        };
        AnalyticsFlags {
            dim: lookup("dim", defaults.dim),
            mva: lookup("mva", defaults.mva),
            kva: lookup("kva", defaults.kva),
            cva_sensi: lookup("cvaSensi", defaults.cva_sensi),
        }
    }

    /// Cube interpretation implied by the grid.
    ///
    /// A close-out grid always runs as `NoLag`; a configured `Regular`
    /// calculation type is overridden with a warning.
    pub fn cube_interpretation(&self) -> CubeInterpretation {
        match self.scenario_generator.close_out_lag_days {
            Some(lag) => {
                if self.calculation_type != CalculationType::NoLag {
                    warn!(
                        configured = ?self.calculation_type,
                        "close-out grid configured, calculation type set to NoLag"
                    );
                }
                if self.store_flows {
                    warn!("store_flows is ignored on a close-out grid");
                }
                CubeInterpretation::MporGrid {
                    close_out_lag_days: lag,
                }
            }
            None => {
                if self.calculation_type == CalculationType::NoLag {
                    warn!("NoLag needs a close-out grid, running Regular");
                }
                CubeInterpretation::Regular {
                    store_flows: self.store_flows,
                }
            }
        }
    }

    /// DIM settings.
    pub fn dim_config(&self) -> Result<DimConfig> {
        let regressors = self
            .dim_regressors
            .iter()
            .map(|r| {
                r.parse::<ScenarioDataKey>()
                    .map_err(|_| XvaError::configuration(format!("unknown DIM regressor '{}'", r)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(DimConfig {
            regression_order: self.dim_regression_order,
            regressors,
            local_regression_evaluations: self.dim_local_regression_evaluations,
            local_regression_bandwidth: self.dim_local_regression_bandwidth,
            quantile: self.dim_quantile,
            horizon_calendar_days: self.dim_horizon_calendar_days,
        })
    }

    /// Report settings.
    pub fn post_process_settings(&self) -> PostProcessSettings {
        PostProcessSettings {
            analytics: self.analytics(),
            dva_name: self.dva_name.clone(),
            fva_borrowing_curve: self.fva_borrowing_curve.clone(),
            fva_lending_curve: self.fva_lending_curve.clone(),
            full_initial_collateralisation: self.full_initial_collateralisation,
            pfe_quantile: self.pfe_quantile,
            kva: self.kva,
        }
    }

    /// Today's market described by this configuration.
    pub fn todays_market(&self) -> Result<TodaysMarket> {
        Ok(TodaysMarket::from_data(
            self.asof,
            self.base_currency,
            self.conventions.day_count,
            &self.market,
        )?)
    }
}
