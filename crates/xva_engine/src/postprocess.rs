//! Post-processing of completed cubes into exposure and XVA reports.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use xva_cube::{AggregationScenarioData, CubeInterpretation, NpvCube, ScenarioDataKey, ValuationCube};
use xva_models::{CreditCurve, CrossAssetModel, Currency, TodaysMarket};

use crate::dim::DimResults;
use crate::error::{Result, XvaError};
use crate::portfolio::{CounterpartyId, NettingSetId};
use crate::xva::{
    compute_cva, compute_cva_cs01, compute_dva, compute_fba, compute_fca, compute_kva,
    compute_mva, ExposureCalculator, ExposureProfile, KvaParams, DEFAULT_PFE_QUANTILE,
};

/// Which optional analytics a run produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsFlags {
    /// Dynamic initial margin.
    pub dim: bool,
    /// Margin valuation adjustment (needs DIM).
    pub mva: bool,
    /// Capital valuation adjustment.
    pub kva: bool,
    /// CVA spread sensitivity.
    pub cva_sensi: bool,
}

impl Default for AnalyticsFlags {
    fn default() -> Self {
        Self {
            dim: true,
            mva: true,
            kva: false,
            cva_sensi: true,
        }
    }
}

impl AnalyticsFlags {
    /// True if DIM must be computed.
    #[inline]
    pub fn needs_dim(&self) -> bool {
        self.dim || self.mva
    }
}

/// Report settings.
#[derive(Clone, Debug, PartialEq)]
pub struct PostProcessSettings {
    /// Optional analytics.
    pub analytics: AnalyticsFlags,
    /// Own credit curve name for DVA.
    pub dva_name: Option<String>,
    /// Funding spread curve for FCA and MVA.
    pub fva_borrowing_curve: Option<String>,
    /// Funding spread curve for FBA.
    pub fva_lending_curve: Option<String>,
    /// Deduct DIM from positive exposure.
    pub full_initial_collateralisation: bool,
    /// PFE confidence level.
    pub pfe_quantile: f64,
    /// KVA capital proxy.
    pub kva: KvaParams,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            analytics: AnalyticsFlags::default(),
            dva_name: None,
            fva_borrowing_curve: None,
            fva_lending_curve: None,
            full_initial_collateralisation: false,
            pfe_quantile: DEFAULT_PFE_QUANTILE,
            kva: KvaParams::default(),
        }
    }
}

/// Everything a post-processor reads.
#[derive(Clone, Copy, Debug)]
pub struct PostProcessInput<'a> {
    /// Today's market (credit and funding curves).
    pub market: &'a TodaysMarket,
    /// Calibrated cross-asset model of the run.
    pub model: &'a Arc<CrossAssetModel>,
    /// Trade cube.
    pub npv_cube: &'a ValuationCube,
    /// Netting cube.
    pub netting_cube: &'a ValuationCube,
    /// Aggregation scenario data.
    pub scenario_data: &'a AggregationScenarioData,
    /// How the cube depth is read.
    pub interpretation: CubeInterpretation,
    /// DIM, if computed.
    pub dim: Option<&'a DimResults>,
    /// Counterparty of each netting cube id.
    pub counterparties: &'a [CounterpartyId],
    /// Netting cube index of each trade cube id.
    pub trade_to_netting: &'a [usize],
}

/// Exposure of a single trade.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeExposure {
    /// Trade id.
    pub trade_id: String,
    /// Netting set of the trade.
    pub netting_set_id: NettingSetId,
    /// Expected exposure per time point.
    pub ee: Vec<f64>,
    /// Time-averaged EE.
    pub epe: f64,
}

/// Exposures and adjustments of one netting set.
///
/// Adjustments are `None` when not requested or when a needed curve is
/// missing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NettingSetReport {
    /// Netting set id.
    pub netting_set_id: NettingSetId,
    /// Counterparty.
    pub counterparty_id: CounterpartyId,
    /// As-of date followed by the valuation dates.
    pub dates: Vec<NaiveDate>,
    /// Exposure statistics, discounted.
    pub exposure: ExposureProfile,
    /// Discounted expected DIM, when computed.
    pub expected_dim: Option<Vec<f64>>,
    /// CVA.
    pub cva: Option<f64>,
    /// DVA.
    pub dva: Option<f64>,
    /// Funding cost adjustment.
    pub fca: Option<f64>,
    /// Funding benefit adjustment.
    pub fba: Option<f64>,
    /// Margin valuation adjustment.
    pub mva: Option<f64>,
    /// Capital valuation adjustment.
    pub kva: Option<f64>,
    /// CVA change for a 1bp hazard rate bump.
    pub cva_cs01: Option<f64>,
}

impl NettingSetReport {
    /// FCA minus FBA, counting a missing side as zero.
    pub fn fva(&self) -> Option<f64> {
        match (self.fca, self.fba) {
            (None, None) => None,
            (fca, fba) => Some(fca.unwrap_or(0.0) - fba.unwrap_or(0.0)),
        }
    }
}

/// Report set of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct XvaReport {
    /// As-of date.
    pub asof: NaiveDate,
    /// Reporting currency.
    pub base_currency: Currency,
    /// One report per netting set, in netting cube order.
    pub netting_sets: Vec<NettingSetReport>,
    /// One exposure per trade, in trade cube order.
    pub trades: Vec<TradeExposure>,
}

impl XvaReport {
    /// Report of one netting set.
    pub fn netting_set(&self, id: &str) -> Option<&NettingSetReport> {
        self.netting_sets
            .iter()
            .find(|r| r.netting_set_id.as_str() == id)
    }

    /// Sum of an adjustment over the netting sets that report it.
    pub fn total(&self, adjustment: impl Fn(&NettingSetReport) -> Option<f64>) -> f64 {
        self.netting_sets.iter().filter_map(adjustment).sum()
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| XvaError::configuration(format!("report serialisation: {}", e)))
    }
}

/// Turns completed cubes into a report.
pub trait PostProcessor: Send + Sync + Debug {
    /// Builds the report.
    fn process(&self, input: &PostProcessInput<'_>, settings: &PostProcessSettings) -> Result<XvaReport>;
}

/// Standard exposure and XVA post-processor.
#[derive(Clone, Copy, Debug, Default)]
pub struct PostProcess;

impl PostProcess {
    /// Creates the post-processor.
    pub fn new() -> Self {
        Self
    }

    fn check(input: &PostProcessInput<'_>) -> Result<()> {
        let netting = input.netting_cube;
        if input.model.asof() != netting.asof() {
            return Err(XvaError::configuration(format!(
                "model as-of {} does not match cube as-of {}",
                input.model.asof(),
                netting.asof()
            )));
        }
        if !input.model.is_calibrated() {
            warn!("post-processing with an uncalibrated model");
        }
        if input.counterparties.len() != netting.num_ids() {
            return Err(XvaError::dimension_mismatch(format!(
                "{} counterparties for {} netting sets",
                input.counterparties.len(),
                netting.num_ids()
            )));
        }
        if input.trade_to_netting.len() != input.npv_cube.num_ids()
            || input.trade_to_netting.iter().any(|&ns| ns >= netting.num_ids())
        {
            return Err(XvaError::dimension_mismatch(
                "trade to netting set mapping does not match the cubes".to_string(),
            ));
        }
        if input.npv_cube.dates() != netting.dates()
            || input.scenario_data.dates() != netting.dates()
            || input.scenario_data.samples() != netting.samples()
        {
            return Err(XvaError::dimension_mismatch(
                "cubes and scenario data disagree on dates or samples".to_string(),
            ));
        }
        if let Some(dim) = input.dim {
            if dim.netting_ids() != netting.ids() || dim.samples() != netting.samples() {
                return Err(XvaError::dimension_mismatch(
                    "DIM results do not match the netting cube".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Discounted values `[sample][time]` of one cube id, t0 first.
    fn paths(
        cube: &ValuationCube,
        interpretation: &CubeInterpretation,
        id: usize,
        collateral: Option<(&DimResults, &[Vec<f64>])>,
        ns: usize,
    ) -> Result<Vec<Vec<f64>>> {
        let npv_index = interpretation.layout().npv_index();
        let t0 = cube.get_t0(id, npv_index)?;
        (0..cube.samples())
            .map(|sample| {
                let mut path = Vec::with_capacity(cube.num_dates() + 1);
                path.push(t0);
                for date in 0..cube.num_dates() {
                    let mut v = interpretation.default_date_npv(cube, id, date, sample)?;
                    if let Some((dim, numeraire)) = collateral {
                        if v > 0.0 {
                            let im = dim.dim(ns, date, sample).unwrap_or(0.0) / numeraire[date][sample];
                            v = (v - im).max(0.0);
                        }
                    }
                    path.push(v);
                }
                Ok::<_, XvaError>(path)
            })
            .collect()
    }

    fn credit_curve(market: &TodaysMarket, name: &str, what: &str) -> Option<CreditCurve> {
        match market.credit_curve(name) {
            Ok(curve) => Some(curve),
            Err(e) => {
                warn!(curve = name, error = %e, "{} skipped", what);
                None
            }
        }
    }

    fn spread(market: &TodaysMarket, name: Option<&str>, what: &str) -> Option<f64> {
        let name = name?;
        match market.spread(name) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(curve = name, error = %e, "{} skipped", what);
                None
            }
        }
    }

    fn netting_set_report(
        &self,
        input: &PostProcessInput<'_>,
        settings: &PostProcessSettings,
        ns: usize,
        times: &[f64],
        dates: &[NaiveDate],
        numeraire: &[Vec<f64>],
    ) -> Result<NettingSetReport> {
        let market = input.market;
        let netting = input.netting_cube;
        let collateral = match (settings.full_initial_collateralisation, input.dim) {
            (true, Some(dim)) => Some((dim, numeraire)),
            (true, None) => {
                warn!("full initial collateralisation requested without DIM, ignored");
                None
            }
            _ => None,
        };
        let values = Self::paths(netting, &input.interpretation, ns, collateral, ns)?;
        let exposure = ExposureProfile::from_values(&values, times.to_vec(), settings.pfe_quantile);

        let expected_dim = input.dim.map(|dim| {
            let mut profile = Vec::with_capacity(times.len());
            for date in 0..netting.num_dates() {
                let total: f64 = (0..netting.samples())
                    .map(|s| dim.dim(ns, date, s).unwrap_or(0.0) / numeraire[date][s])
                    .sum();
                profile.push(total / netting.samples().max(1) as f64);
            }
            // flat extrapolation back to the as-of date
            let first = profile.first().copied().unwrap_or(0.0);
            profile.insert(0, first);
            profile
        });

        let counterparty = &input.counterparties[ns];
        let cp_curve = Self::credit_curve(market, counterparty.as_str(), "CVA");
        let cva = cp_curve.map(|c| compute_cva(&exposure.ee, times, &c));
        let cva_cs01 = if settings.analytics.cva_sensi {
            cp_curve.map(|c| compute_cva_cs01(&exposure.ee, times, &c))
        } else {
            None
        };
        let dva = settings
            .dva_name
            .as_deref()
            .and_then(|name| Self::credit_curve(market, name, "DVA"))
            .map(|c| compute_dva(&exposure.ene, times, &c));

        let borrowing = Self::spread(market, settings.fva_borrowing_curve.as_deref(), "FCA");
        let lending = Self::spread(market, settings.fva_lending_curve.as_deref(), "FBA");
        let fca = borrowing.map(|s| compute_fca(&exposure.ee, times, s));
        let fba = lending.map(|s| compute_fba(&exposure.ene, times, s));
        let mva = if settings.analytics.mva {
            match (&expected_dim, borrowing) {
                (Some(profile), Some(s)) => Some(compute_mva(profile, times, s)),
                _ => {
                    warn!(netting_set = %netting.ids()[ns], "MVA needs DIM and a borrowing curve, skipped");
                    None
                }
            }
        } else {
            None
        };
        let kva = settings
            .analytics
            .kva
            .then(|| compute_kva(&exposure.ee, times, &settings.kva));

        Ok(NettingSetReport {
            netting_set_id: NettingSetId::new(netting.ids()[ns].as_str()),
            counterparty_id: counterparty.clone(),
            dates: dates.to_vec(),
            exposure,
            expected_dim: if settings.analytics.dim { expected_dim } else { None },
            cva,
            dva,
            fca,
            fba,
            mva,
            kva,
            cva_cs01,
        })
    }
}

impl PostProcessor for PostProcess {
    fn process(&self, input: &PostProcessInput<'_>, settings: &PostProcessSettings) -> Result<XvaReport> {
        Self::check(input)?;
        let netting = input.netting_cube;
        let market = input.market;

        let mut dates = Vec::with_capacity(netting.num_dates() + 1);
        dates.push(netting.asof());
        dates.extend_from_slice(netting.dates());
        let times: Vec<f64> = dates.iter().map(|d| market.time(*d)).collect();
        let numeraire_key = ScenarioDataKey::numeraire();
        let numeraire = (0..netting.num_dates())
            .map(|date| input.scenario_data.values_at(date, &numeraire_key))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        info!(netting_sets = netting.num_ids(), "Post-processing");
        let netting_sets = (0..netting.num_ids())
            .into_par_iter()
            .map(|ns| self.netting_set_report(input, settings, ns, &times, &dates, &numeraire))
            .collect::<Result<Vec<_>>>()?;

        let trades = (0..input.npv_cube.num_ids())
            .map(|t| {
                let values = Self::paths(input.npv_cube, &input.interpretation, t, None, 0)?;
                let ee = ExposureCalculator::expected_exposure(&values);
                let epe = ExposureCalculator::expected_positive_exposure(&ee, &times);
                let ns = input.trade_to_netting[t];
                Ok::<_, XvaError>(TradeExposure {
                    trade_id: input.npv_cube.ids()[t].clone(),
                    netting_set_id: NettingSetId::new(netting.ids()[ns].as_str()),
                    ee,
                    epe,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(XvaReport {
            asof: netting.asof(),
            base_currency: market.base_currency(),
            netting_sets,
            trades,
        })
    }
}
