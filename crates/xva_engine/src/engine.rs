//! Valuation engine: fills NPV cubes, netting cubes and scenario data.
//!
//! # Execution model
//!
//! ```text
//! t0:        today's market ──► calculate_t0 per trade ──► cube t0 slots
//!
//! samples:   ┌ worker 0: market clone ─ path(s) ─► block s  (cube, netting, scenario data)
//!   (rayon)  ├ worker 1: market clone ─ path(s') ─► block s'
//!            └ ...
//! ```
//!
//! Each sample owns disjoint blocks of every output store, so workers write
//! without synchronisation. Path seeds depend only on the run seed and the
//! sample index, so results are independent of scheduling.

use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use xva_cube::{
    combine_sample, AggregationScenarioData, NettingAggregator, NettingRule, NpvCube,
    ScenarioBlockMut, ScenarioDataKey, SampleBlockMut, ValuationCube,
};
use xva_models::scenario::fx_currencies;
use xva_models::{
    GridPointKind, Scenario, ScenarioGenerator, ScenarioSimMarket, SimulatedMarket,
};

use crate::calculators::{CalculationError, ValuationCalculator};
use crate::error::{Result, XvaError};
use crate::instruments::PricedInstrument;
use crate::parallel::ParallelConfig;
use crate::portfolio::TradeId;

/// Trade ready for simulation, in cube id order.
#[derive(Clone, Debug)]
pub struct BuiltTrade {
    /// Trade id (cube id).
    pub id: TradeId,
    /// Pricing representation.
    pub instrument: Arc<dyn PricedInstrument>,
}

/// A trade that could not be priced on one path step.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct PathFailure {
    /// Trade id.
    pub trade_id: String,
    /// Sample index; `None` for today's valuation.
    pub sample: Option<usize>,
    /// Date of the failing step.
    pub date: NaiveDate,
    /// Cause.
    pub cause: String,
}

/// Netting cube filled inline, sample by sample.
#[derive(Debug)]
pub struct NettingTarget<'a> {
    /// Netting cube, ids in netting set order.
    pub cube: &'a mut ValuationCube,
    /// Netting cube index of each trade.
    pub trade_to_netting: &'a [usize],
    /// Combination rule per depth slot.
    pub rules: &'a [NettingRule],
}

#[derive(Clone, Copy, Debug)]
enum ScenarioValue {
    Numeraire,
    FxSpot(usize),
    ShortRate(usize),
}

impl ScenarioValue {
    #[inline]
    fn read(self, scenario: &Scenario) -> f64 {
        match self {
            ScenarioValue::Numeraire => scenario.numeraire(),
            ScenarioValue::FxSpot(j) => scenario.fx_spots()[j],
            ScenarioValue::ShortRate(i) => scenario.short_rates()[i],
        }
    }
}

struct SampleWork<'a> {
    sample: usize,
    trades: SampleBlockMut<'a>,
    netting: Option<SampleBlockMut<'a>>,
    scenario: ScenarioBlockMut<'a>,
}

/// Per-run inputs shared read-only by every worker.
struct RunContext<'a> {
    trades: &'a [BuiltTrade],
    calculators: &'a [Arc<dyn ValuationCalculator>],
    dates: &'a [NaiveDate],
    keys: &'a [(ScenarioDataKey, ScenarioValue)],
    mapping: Option<(&'a [usize], &'a [NettingRule])>,
    continue_on_err: bool,
}

/// Scenario-by-scenario revaluation of a built portfolio.
#[derive(Clone, Debug)]
pub struct ValuationEngine {
    generator: ScenarioGenerator,
    market: ScenarioSimMarket,
    sticky_date: bool,
    parallel: ParallelConfig,
}

impl ValuationEngine {
    /// Creates an engine over a scenario generator and a simulated market.
    ///
    /// With `sticky_date`, close-out scenarios are priced with the evaluation
    /// date held at the associated valuation date.
    pub fn new(generator: ScenarioGenerator, market: ScenarioSimMarket, sticky_date: bool) -> Self {
        Self {
            generator,
            market,
            sticky_date,
            parallel: ParallelConfig::default(),
        }
    }

    /// Sets the parallel execution settings.
    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    /// Scenario generator.
    #[inline]
    pub fn generator(&self) -> &ScenarioGenerator {
        &self.generator
    }

    /// Scenario data keys recorded by [`ValuationEngine::build_cube`].
    pub fn scenario_data_keys(&self) -> Vec<ScenarioDataKey> {
        self.scenario_values().into_iter().map(|(k, _)| k).collect()
    }

    fn scenario_values(&self) -> Vec<(ScenarioDataKey, ScenarioValue)> {
        let model = self.generator.model();
        let mut keys = vec![(ScenarioDataKey::numeraire(), ScenarioValue::Numeraire)];
        for (j, ccy) in fx_currencies(model).into_iter().enumerate() {
            keys.push((ScenarioDataKey::fx_spot(ccy.code()), ScenarioValue::FxSpot(j)));
        }
        for (i, factor) in model.ir_factors().iter().enumerate() {
            keys.push((
                ScenarioDataKey::short_rate(factor.currency().code()),
                ScenarioValue::ShortRate(i),
            ));
        }
        keys
    }

    /// Fills `cube` (and `netting` if given) with every calculator's values
    /// for every trade, valuation date and sample, and records scenario data
    /// on valuation dates.
    ///
    /// Pricing failures abort the run unless `continue_on_err`, in which case
    /// the cell keeps its fill value and the failure is returned.
    ///
    /// # Errors
    ///
    /// - `XvaError::DimensionMismatch` if any store does not match the run,
    ///   raised before any work
    /// - `XvaError::Pricing` on the first pricing failure without
    ///   `continue_on_err`
    /// - `XvaError::Index` on any out-of-range cube access
    pub fn build_cube(
        &self,
        trades: &[BuiltTrade],
        calculators: &[Arc<dyn ValuationCalculator>],
        cube: &mut ValuationCube,
        netting: Option<NettingTarget<'_>>,
        scenario_data: &mut AggregationScenarioData,
        continue_on_err: bool,
    ) -> Result<Vec<PathFailure>> {
        self.check_dimensions(trades, calculators, cube, netting.as_ref(), scenario_data)?;

        let grid = Arc::clone(self.generator.grid());
        let dates = grid.valuation_dates();
        let samples = self.generator.samples();
        let keys = self.scenario_values();

        info!(
            trades = trades.len(),
            dates = dates.len(),
            samples,
            calculators = calculators.len(),
            "Building NPV cube"
        );

        let mut failures = self.fill_t0(trades, calculators, cube, dates, continue_on_err)?;

        let (netting_blocks, mapping) = match netting {
            Some(NettingTarget {
                cube: netting_cube,
                trade_to_netting,
                rules,
            }) => {
                NettingAggregator::new().aggregate_t0(cube, netting_cube, trade_to_netting, rules)?;
                let blocks: Vec<Option<SampleBlockMut<'_>>> =
                    netting_cube.sample_blocks_mut().into_iter().map(Some).collect();
                (blocks, Some((trade_to_netting, rules)))
            }
            None => ((0..samples).map(|_| None).collect(), None),
        };

        let work: Vec<SampleWork<'_>> = cube
            .sample_blocks_mut()
            .into_iter()
            .zip(netting_blocks)
            .zip(scenario_data.sample_blocks_mut())
            .enumerate()
            .map(|(sample, ((trades, netting), scenario))| SampleWork {
                sample,
                trades,
                netting,
                scenario,
            })
            .collect();

        let ctx = RunContext {
            trades,
            calculators,
            dates,
            keys: &keys,
            mapping,
            continue_on_err,
        };

        let parallel = self.parallel.should_parallelize(samples);
        debug!(parallel, threads = self.parallel.effective_threads(), "Sample loop");
        let per_sample: Result<Vec<Vec<PathFailure>>> = self.parallel.install(|| {
            if parallel {
                work.into_par_iter()
                    .with_min_len(self.parallel.batch_size.max(1))
                    .map_init(
                        || self.market.clone(),
                        |market, w| self.run_sample(market, w, &ctx),
                    )
                    .collect()
            } else {
                let mut market = self.market.clone();
                work.into_iter()
                    .map(|w| self.run_sample(&mut market, w, &ctx))
                    .collect()
            }
        })?;

        failures.extend(per_sample?.into_iter().flatten());
        if !failures.is_empty() {
            warn!(failures = failures.len(), "Pricing failures recorded");
        }
        info!("NPV cube complete");
        Ok(failures)
    }

    fn check_dimensions(
        &self,
        trades: &[BuiltTrade],
        calculators: &[Arc<dyn ValuationCalculator>],
        cube: &ValuationCube,
        netting: Option<&NettingTarget<'_>>,
        scenario_data: &AggregationScenarioData,
    ) -> Result<()> {
        let dates = self.generator.grid().valuation_dates();
        let samples = self.generator.samples();

        if cube.dates() != dates {
            return Err(XvaError::dimension_mismatch(format!(
                "cube has {} dates, grid has {}",
                cube.num_dates(),
                dates.len()
            )));
        }
        if cube.samples() != samples {
            return Err(XvaError::dimension_mismatch(format!(
                "cube has {} samples, generator has {}",
                cube.samples(),
                samples
            )));
        }
        let ids_match = cube.num_ids() == trades.len()
            && cube
                .ids()
                .iter()
                .zip(trades)
                .all(|(id, t)| id.as_str() == t.id.as_str());
        if !ids_match {
            return Err(XvaError::dimension_mismatch(format!(
                "cube ids do not match the {} built trades",
                trades.len()
            )));
        }
        if let Some(slot) = calculators
            .iter()
            .flat_map(|c| c.slots())
            .find(|&s| s >= cube.depth())
        {
            return Err(XvaError::dimension_mismatch(format!(
                "calculator slot {} exceeds cube depth {}",
                slot,
                cube.depth()
            )));
        }
        if scenario_data.dates() != dates || scenario_data.samples() != samples {
            return Err(XvaError::dimension_mismatch(
                "scenario data does not match the grid".to_string(),
            ));
        }
        if let Some(target) = netting {
            let n = &*target.cube;
            if n.dates() != dates || n.samples() != samples || n.depth() != cube.depth() {
                return Err(XvaError::dimension_mismatch(
                    "netting cube does not match the trade cube".to_string(),
                ));
            }
            if target.trade_to_netting.len() != trades.len()
                || target.trade_to_netting.iter().any(|&ns| ns >= n.num_ids())
            {
                return Err(XvaError::dimension_mismatch(
                    "trade to netting set mapping does not match the netting cube".to_string(),
                ));
            }
            if target.rules.len() != cube.depth() {
                return Err(XvaError::dimension_mismatch(format!(
                    "{} netting rules for depth {}",
                    target.rules.len(),
                    cube.depth()
                )));
            }
        }
        Ok(())
    }

    fn fill_t0(
        &self,
        trades: &[BuiltTrade],
        calculators: &[Arc<dyn ValuationCalculator>],
        cube: &mut ValuationCube,
        dates: &[NaiveDate],
        continue_on_err: bool,
    ) -> Result<Vec<PathFailure>> {
        let mut market = self.market.clone();
        market.reset();
        let mut failures = Vec::new();
        for (i, trade) in trades.iter().enumerate() {
            for calc in calculators {
                match calc.calculate_t0(i, trade.instrument.as_ref(), &market, dates, cube) {
                    Ok(()) => {}
                    Err(CalculationError::Index(e)) => return Err(e.into()),
                    Err(CalculationError::Pricing(e)) => {
                        if !continue_on_err {
                            return Err(XvaError::Pricing {
                                trade_id: trade.id.to_string(),
                                sample: 0,
                                cause: format!("t0 valuation: {}", e),
                            });
                        }
                        warn!(trade = %trade.id, calculator = calc.name(), error = %e, "t0 valuation failed");
                        failures.push(PathFailure {
                            trade_id: trade.id.to_string(),
                            sample: None,
                            date: market.asof(),
                            cause: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(failures)
    }

    fn run_sample(
        &self,
        market: &mut ScenarioSimMarket,
        mut work: SampleWork<'_>,
        ctx: &RunContext<'_>,
    ) -> Result<Vec<PathFailure>> {
        let mut failures = Vec::new();
        market.reset();

        for scenario in self.generator.path(work.sample) {
            market.advance(&scenario);
            let point = *scenario.point();
            match point.kind {
                GridPointKind::CloseOut if self.sticky_date => {
                    market.set_evaluation_date(ctx.dates[point.valuation_index]);
                }
                GridPointKind::Valuation => {
                    for (key, value) in ctx.keys {
                        work.scenario
                            .set(point.valuation_index, key, value.read(&scenario))?;
                    }
                }
                GridPointKind::CloseOut => {}
            }

            for (i, trade) in ctx.trades.iter().enumerate() {
                for calc in ctx.calculators {
                    let outcome = calc.calculate(
                        i,
                        trade.instrument.as_ref(),
                        &*market,
                        &point,
                        ctx.dates,
                        &mut work.trades,
                    );
                    match outcome {
                        Ok(()) => {}
                        Err(CalculationError::Index(e)) => return Err(e.into()),
                        Err(CalculationError::Pricing(e)) => {
                            if !ctx.continue_on_err {
                                return Err(XvaError::Pricing {
                                    trade_id: trade.id.to_string(),
                                    sample: work.sample,
                                    cause: e.to_string(),
                                });
                            }
                            failures.push(PathFailure {
                                trade_id: trade.id.to_string(),
                                sample: Some(work.sample),
                                date: point.date,
                                cause: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        if let (Some(netting), Some((mapping, rules))) = (work.netting.as_mut(), ctx.mapping) {
            combine_sample(work.trades.as_block(), netting, mapping, rules)?;
        }
        Ok(failures)
    }
}
