//! XVA run orchestration.
//!
//! [`XvaRunner`] drives a run through three stages, each of which can also be
//! called on its own:
//!
//! ```text
//! prepare ──► build_cube ──► generate_post_processor
//!   model       NPV cube        DIM regression
//!   grid        netting cube    exposures, CVA/DVA/FVA/MVA/KVA
//!   sim market  scenario data   report
//! ```
//!
//! Accessors return `XvaError::Precondition` until the stage producing their
//! value has completed. Calling [`XvaRunner::prepare`] again starts a new run
//! and discards every later output.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use xva_cube::{
    AggregationScenarioData, CubeInterpretation, NettingAggregator, NpvCube, ValuationCube,
};
use xva_models::{
    CalibrationFailure, CrossAssetModel, CrossAssetModelBuilder, Currency, ScenarioGenerator,
    ScenarioProjection, ScenarioSimMarket, TodaysMarket, UnsupportedProjection,
};

use crate::calculators::{calculators_for_layout, netting_rules};
use crate::config::XvaRunnerConfig;
use crate::dim::{DimCalculator, DimResults};
use crate::engine::{BuiltTrade, NettingTarget, PathFailure, ValuationEngine};
use crate::engine_data::PricingExtension;
use crate::error::{PortfolioError, Result, XvaError};
use crate::instruments::BuildContext;
use crate::portfolio::{CounterpartyId, NettingSetId, Portfolio, TradeId};
use crate::postprocess::{PostProcess, PostProcessInput, PostProcessor, XvaReport};

/// Trade that could not be built and was left out of the cube.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TradeFailure {
    /// Trade id.
    pub trade_id: String,
    /// Cause.
    pub cause: String,
}

/// Last completed stage of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Nothing has run yet.
    Idle,
    /// Model, grid and simulated market are ready.
    Prepared,
    /// Cubes and scenario data are filled.
    CubeBuilt,
    /// Report is available.
    PostProcessed,
}

struct Simulation {
    market: TodaysMarket,
    model: Arc<CrossAssetModel>,
    generator: ScenarioGenerator,
    sim_market: ScenarioSimMarket,
    sticky_date: bool,
    calibrated: bool,
}

struct CubeOutputs {
    npv_cube: Arc<ValuationCube>,
    netting_cube: Arc<ValuationCube>,
    scenario_data: Arc<AggregationScenarioData>,
    trade_failures: Vec<TradeFailure>,
    path_failures: Vec<PathFailure>,
}

struct PostProcessOutputs {
    dim: Option<DimResults>,
    report: XvaReport,
}

/// Runs the exposure simulation and XVA post-processing for a portfolio.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use xva_engine::config::XvaRunnerConfig;
/// use xva_engine::portfolio::Portfolio;
/// use xva_engine::runner::XvaRunner;
///
/// # fn main() -> xva_engine::error::Result<()> {
/// let config = XvaRunnerConfig::load("run.toml".as_ref())?;
/// let market = config.todays_market()?;
/// let mut runner = XvaRunner::new(config, Arc::new(Portfolio::new()));
/// let report = runner.run(&market, false)?;
/// println!("{}", report.to_json()?);
/// # Ok(())
/// # }
/// ```
pub struct XvaRunner {
    config: XvaRunnerConfig,
    portfolio: Arc<Portfolio>,
    extensions: Vec<Arc<dyn PricingExtension>>,
    projection: Box<dyn ScenarioProjection>,
    post_processor: Box<dyn PostProcessor>,
    stage: Stage,
    calibration_failures: Vec<CalibrationFailure>,
    simulation: Option<Simulation>,
    cubes: Option<CubeOutputs>,
    outputs: Option<PostProcessOutputs>,
}

impl XvaRunner {
    /// Creates a runner for `portfolio`.
    pub fn new(config: XvaRunnerConfig, portfolio: Arc<Portfolio>) -> Self {
        Self {
            config,
            portfolio,
            extensions: Vec::new(),
            projection: Box::new(UnsupportedProjection),
            post_processor: Box::new(PostProcess::new()),
            stage: Stage::Idle,
            calibration_failures: Vec::new(),
            simulation: None,
            cubes: None,
            outputs: None,
        }
    }

    /// Pricing extensions, reset on every [`XvaRunner::prepare`].
    pub fn with_extensions(mut self, extensions: Vec<Arc<dyn PricingExtension>>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Replaces the currency projection capability.
    pub fn with_projection(mut self, projection: Box<dyn ScenarioProjection>) -> Self {
        self.projection = projection;
        self
    }

    /// Replaces the post-processor.
    pub fn with_post_processor(mut self, post_processor: Box<dyn PostProcessor>) -> Self {
        self.post_processor = post_processor;
        self
    }

    /// Run configuration.
    #[inline]
    pub fn config(&self) -> &XvaRunnerConfig {
        &self.config
    }

    /// Portfolio.
    #[inline]
    pub fn portfolio(&self) -> &Arc<Portfolio> {
        &self.portfolio
    }

    /// Last completed stage.
    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Builds the model, date grid, scenario generator and simulated market.
    ///
    /// With `currencies`, the simulation is restricted to those currencies
    /// through the projection capability and calibration is deferred to
    /// [`XvaRunner::generate_post_processor`].
    ///
    /// # Errors
    ///
    /// - `XvaError::Configuration` for an invalid configuration or a market
    ///   whose as-of date differs from the run's
    /// - `XvaError::UnsupportedOperation` if `currencies` is given and the
    ///   projection capability is unavailable
    /// - `XvaError::ModelCalibration` if the model cannot be built, or a
    ///   calibration fails without `continue_on_err`
    pub fn prepare(
        &mut self,
        market: &TodaysMarket,
        continue_on_err: bool,
        currencies: Option<&[Currency]>,
    ) -> Result<()> {
        self.config.validate()?;
        if market.asof() != self.config.asof {
            return Err(XvaError::configuration(format!(
                "market as-of {} does not match run as-of {}",
                market.asof(),
                self.config.asof
            )));
        }

        self.stage = Stage::Idle;
        self.simulation = None;
        self.cubes = None;
        self.outputs = None;
        self.calibration_failures.clear();

        let (sim_parameters, generator_data) = match currencies {
            Some(ccys) => {
                info!(currencies = ?ccys, "Projecting simulation onto currencies");
                (
                    self.projection
                        .project_sim_market_parameters(&self.config.sim_market, ccys)?,
                    self.projection
                        .projected_scenario_generator(&self.config.scenario_generator, ccys)?,
                )
            }
            None => (
                self.config.sim_market.clone(),
                self.config.scenario_generator.clone(),
            ),
        };

        let calibrate = currencies.is_none();
        let build = CrossAssetModelBuilder::new(market, &self.config.model)
            .continue_on_error(continue_on_err)
            .build(calibrate)?;
        self.record_calibration_failures(build.failures);

        let grid = Arc::new(generator_data.date_grid(self.config.asof)?);
        let generator = ScenarioGenerator::new(
            Arc::clone(&build.model),
            Arc::clone(&grid),
            generator_data.samples,
            generator_data.seed,
        );
        let sim_market = ScenarioSimMarket::new(Arc::clone(&build.model), &sim_parameters)?;

        for extension in &self.extensions {
            debug!(extension = extension.name(), "Resetting pricing extension");
            extension.reset();
        }

        info!(
            asof = %self.config.asof,
            dates = grid.valuation_dates().len(),
            close_out_lag_days = ?grid.close_out_lag_days(),
            samples = generator_data.samples,
            calibrated = calibrate,
            "Run prepared"
        );

        self.simulation = Some(Simulation {
            market: market.clone(),
            model: build.model,
            generator,
            sim_market,
            sticky_date: generator_data.mpor_sticky_date,
            calibrated: calibrate,
        });
        self.stage = Stage::Prepared;
        Ok(())
    }

    /// Builds the trades and fills the NPV cube, the netting cube and the
    /// aggregation scenario data.
    ///
    /// With `trade_ids`, only those trades are simulated. Trades that fail
    /// to build are skipped and recorded under `continue_on_err`. Cubes and
    /// results of an earlier build are discarded first.
    ///
    /// # Errors
    ///
    /// - `XvaError::Precondition` before [`XvaRunner::prepare`]
    /// - `XvaError::UnknownTrade` for an id not in the portfolio, raised
    ///   before any allocation
    /// - `XvaError::TradeBuild` or `XvaError::Pricing` without
    ///   `continue_on_err`
    pub fn build_cube(&mut self, trade_ids: Option<&[TradeId]>, continue_on_err: bool) -> Result<()> {
        let simulation = self
            .simulation
            .as_ref()
            .ok_or_else(|| XvaError::precondition("build_cube called before prepare"))?;
        self.cubes = None;
        self.outputs = None;
        self.stage = Stage::Prepared;

        let filtered;
        let portfolio: &Portfolio = match trade_ids {
            Some(ids) => {
                filtered = self.portfolio.filtered(ids).map_err(|e| match e {
                    PortfolioError::TradeNotFound(id) => XvaError::UnknownTrade(id),
                    other => XvaError::Portfolio(other),
                })?;
                &filtered
            }
            None => &self.portfolio,
        };

        self.portfolio.reset_cached_pricing_state();

        let ctx = BuildContext {
            engine_data: &self.config.engine_data,
            reference_data: &self.config.reference_data,
            market: &simulation.sim_market,
        };
        let mut built = Vec::with_capacity(portfolio.len());
        let mut built_trades = Vec::with_capacity(portfolio.len());
        let mut trade_failures = Vec::new();
        for trade in portfolio.trades() {
            match trade.build(&ctx) {
                Ok(instrument) => {
                    built.push(BuiltTrade {
                        id: trade.id().clone(),
                        instrument,
                    });
                    built_trades.push(Arc::clone(trade));
                }
                Err(e) if continue_on_err => {
                    warn!(trade_id = %trade.id(), error = %e, "Trade build failed, skipping");
                    trade_failures.push(TradeFailure {
                        trade_id: trade.id().to_string(),
                        cause: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(XvaError::TradeBuild {
                        trade_id: trade.id().to_string(),
                        cause: e.to_string(),
                    })
                }
            }
        }

        let interpretation = self.config.cube_interpretation();
        let layout = interpretation.layout();
        let calculators = calculators_for_layout(&layout);
        let rules = netting_rules(&calculators, layout.depth());

        let netting_ids: Vec<NettingSetId> = built_trades
            .iter()
            .map(|t| t.netting_set_id().clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let trade_to_netting: Vec<usize> = built_trades
            .iter()
            .map(|t| {
                netting_ids
                    .binary_search(t.netting_set_id())
                    .map_err(|_| XvaError::dimension_mismatch("netting set index"))
            })
            .collect::<Result<_>>()?;

        let grid = simulation.generator.grid();
        let dates = grid.valuation_dates().to_vec();
        let samples = simulation.generator.samples();
        let engine = ValuationEngine::new(
            simulation.generator.clone(),
            simulation.sim_market.clone(),
            simulation.sticky_date,
        )
        .with_parallel(self.config.parallel.clone());

        let mut cube = ValuationCube::allocate(
            self.config.asof,
            built.iter().map(|t| t.id.to_string()).collect(),
            dates.clone(),
            samples,
            layout.depth(),
            0.0,
        )?;
        let mut netting_cube = ValuationCube::allocate(
            self.config.asof,
            netting_ids.iter().map(|n| n.to_string()).collect(),
            dates.clone(),
            samples,
            layout.depth(),
            0.0,
        )?;
        let mut scenario_data =
            AggregationScenarioData::new(dates, samples, engine.scenario_data_keys());

        info!(
            trades = built.len(),
            netting_sets = netting_ids.len(),
            skipped = trade_failures.len(),
            interpretation = ?interpretation,
            inline_netting = self.config.inline_netting,
            "Building cubes"
        );

        let path_failures = if self.config.inline_netting {
            engine.build_cube(
                &built,
                &calculators,
                &mut cube,
                Some(NettingTarget {
                    cube: &mut netting_cube,
                    trade_to_netting: &trade_to_netting,
                    rules: &rules,
                }),
                &mut scenario_data,
                continue_on_err,
            )?
        } else {
            let failures = engine.build_cube(
                &built,
                &calculators,
                &mut cube,
                None,
                &mut scenario_data,
                continue_on_err,
            )?;
            netting_cube = NettingAggregator::new().aggregate(
                &cube,
                &trade_to_netting,
                netting_ids.iter().map(|n| n.to_string()).collect(),
                &rules,
            )?;
            failures
        };

        if !path_failures.is_empty() {
            warn!(count = path_failures.len(), "Pricing failures recorded");
        }

        self.cubes = Some(CubeOutputs {
            npv_cube: Arc::new(cube),
            netting_cube: Arc::new(netting_cube),
            scenario_data: Arc::new(scenario_data),
            trade_failures,
            path_failures,
        });
        self.stage = Stage::CubeBuilt;
        Ok(())
    }

    /// Computes DIM (if requested) and the XVA report from the given cubes.
    ///
    /// The cubes are usually those of [`XvaRunner::build_cube`], but any
    /// cubes over this run's portfolio and grid are accepted; failure records
    /// are kept only for the runner's own cubes. A calibration deferred by a
    /// projected [`XvaRunner::prepare`] is performed first and the calibrated
    /// model is handed to the post-processor.
    ///
    /// # Errors
    ///
    /// - `XvaError::Precondition` before [`XvaRunner::prepare`]
    /// - `XvaError::DimensionMismatch` if the cubes do not match the run's
    ///   cube layout or each other
    /// - `XvaError::UnknownTrade` for a cube id not in the portfolio
    pub fn generate_post_processor(
        &mut self,
        market: &TodaysMarket,
        npv_cube: Arc<ValuationCube>,
        netting_cube: Arc<ValuationCube>,
        scenario_data: Arc<AggregationScenarioData>,
        continue_on_err: bool,
    ) -> Result<()> {
        let calibrated = self
            .simulation
            .as_ref()
            .map(|s| s.calibrated)
            .ok_or_else(|| XvaError::precondition("generate_post_processor called before prepare"))?;

        if !calibrated {
            info!("Calibrating deferred model");
            let build = CrossAssetModelBuilder::new(market, &self.config.model)
                .continue_on_error(continue_on_err)
                .build(true)?;
            self.record_calibration_failures(build.failures);
            if let Some(simulation) = self.simulation.as_mut() {
                simulation.model = build.model;
                simulation.calibrated = true;
            }
        }

        let model = Arc::clone(self.model()?);

        let interpretation = self.config.cube_interpretation();
        self.check_cubes(&npv_cube, &netting_cube, &scenario_data, &interpretation)?;
        let (trade_to_netting, counterparties) = self.netting_structure(&npv_cube, &netting_cube)?;

        let settings = self.config.post_process_settings();
        let dim = if settings.analytics.needs_dim() {
            let calculator = DimCalculator::new(self.config.dim_config()?);
            Some(calculator.compute(&netting_cube, &interpretation, &scenario_data)?)
        } else {
            debug!("DIM not requested");
            None
        };

        let input = PostProcessInput {
            market,
            model: &model,
            npv_cube: &npv_cube,
            netting_cube: &netting_cube,
            scenario_data: &scenario_data,
            interpretation,
            dim: dim.as_ref(),
            counterparties: &counterparties,
            trade_to_netting: &trade_to_netting,
        };
        let report = self.post_processor.process(&input, &settings)?;
        info!(netting_sets = report.netting_sets.len(), "Post-processing complete");

        let own_cubes = self.cubes.as_ref().is_some_and(|cubes| {
            Arc::ptr_eq(&cubes.npv_cube, &npv_cube)
                && Arc::ptr_eq(&cubes.netting_cube, &netting_cube)
                && Arc::ptr_eq(&cubes.scenario_data, &scenario_data)
        });
        if !own_cubes {
            if self.cubes.is_some() {
                debug!("External cubes supplied, dropping failures of the previous build");
            }
            self.cubes = Some(CubeOutputs {
                npv_cube,
                netting_cube,
                scenario_data,
                trade_failures: Vec::new(),
                path_failures: Vec::new(),
            });
        }
        self.outputs = Some(PostProcessOutputs { dim, report });
        self.stage = Stage::PostProcessed;
        Ok(())
    }

    /// Runs every stage on the full portfolio and returns the report.
    pub fn run(&mut self, market: &TodaysMarket, continue_on_err: bool) -> Result<&XvaReport> {
        self.prepare(market, continue_on_err, None)?;
        self.build_cube(None, continue_on_err)?;
        let (npv_cube, netting_cube, scenario_data) = {
            let cubes = self.cube_outputs()?;
            (
                Arc::clone(&cubes.npv_cube),
                Arc::clone(&cubes.netting_cube),
                Arc::clone(&cubes.scenario_data),
            )
        };
        self.generate_post_processor(market, npv_cube, netting_cube, scenario_data, continue_on_err)?;
        self.report()
    }

    /// Cross-asset model of the run.
    pub fn model(&self) -> Result<&Arc<CrossAssetModel>> {
        self.simulation
            .as_ref()
            .map(|s| &s.model)
            .ok_or_else(|| XvaError::precondition("model is built by prepare"))
    }

    /// Today's market the run was prepared with.
    pub fn market(&self) -> Result<&TodaysMarket> {
        self.simulation
            .as_ref()
            .map(|s| &s.market)
            .ok_or_else(|| XvaError::precondition("market is set by prepare"))
    }

    /// Scenario generator of the run.
    pub fn scenario_generator(&self) -> Result<&ScenarioGenerator> {
        self.simulation
            .as_ref()
            .map(|s| &s.generator)
            .ok_or_else(|| XvaError::precondition("scenario generator is built by prepare"))
    }

    /// Calibration failures recorded under `continue_on_err`.
    pub fn calibration_failures(&self) -> Result<&[CalibrationFailure]> {
        self.simulation
            .as_ref()
            .map(|_| self.calibration_failures.as_slice())
            .ok_or_else(|| XvaError::precondition("calibration runs in prepare"))
    }

    /// Trade-level NPV cube.
    pub fn npv_cube(&self) -> Result<&Arc<ValuationCube>> {
        Ok(&self.cube_outputs()?.npv_cube)
    }

    /// Netting-set-level cube.
    pub fn netting_cube(&self) -> Result<&Arc<ValuationCube>> {
        Ok(&self.cube_outputs()?.netting_cube)
    }

    /// Scenario data recorded on valuation dates.
    pub fn aggregation_scenario_data(&self) -> Result<&Arc<AggregationScenarioData>> {
        Ok(&self.cube_outputs()?.scenario_data)
    }

    /// Trades skipped under `continue_on_err`.
    pub fn trade_failures(&self) -> Result<&[TradeFailure]> {
        Ok(&self.cube_outputs()?.trade_failures)
    }

    /// Pricing failures recorded under `continue_on_err`.
    pub fn path_failures(&self) -> Result<&[PathFailure]> {
        Ok(&self.cube_outputs()?.path_failures)
    }

    /// DIM results.
    ///
    /// # Errors
    ///
    /// `XvaError::Precondition` before post-processing, or if neither DIM
    /// nor MVA was requested.
    pub fn dim_results(&self) -> Result<&DimResults> {
        self.post_process_outputs()?
            .dim
            .as_ref()
            .ok_or_else(|| XvaError::precondition("DIM was not requested (analytics dim and mva are off)"))
    }

    /// XVA report.
    pub fn report(&self) -> Result<&XvaReport> {
        Ok(&self.post_process_outputs()?.report)
    }

    fn cube_outputs(&self) -> Result<&CubeOutputs> {
        self.cubes
            .as_ref()
            .ok_or_else(|| XvaError::precondition("cubes are built by build_cube"))
    }

    fn post_process_outputs(&self) -> Result<&PostProcessOutputs> {
        self.outputs
            .as_ref()
            .ok_or_else(|| XvaError::precondition("results are produced by generate_post_processor"))
    }

    fn record_calibration_failures(&mut self, failures: Vec<CalibrationFailure>) {
        for failure in &failures {
            warn!(component = %failure.component, reason = %failure.reason, "Calibration failure recorded");
        }
        self.calibration_failures.extend(failures);
    }

    fn check_cubes(
        &self,
        npv_cube: &ValuationCube,
        netting_cube: &ValuationCube,
        scenario_data: &AggregationScenarioData,
        interpretation: &CubeInterpretation,
    ) -> Result<()> {
        let depth = interpretation.layout().depth();
        if npv_cube.depth() != depth || netting_cube.depth() != depth {
            return Err(XvaError::dimension_mismatch(format!(
                "cube depths {}/{} do not match the {:?} layout depth {}",
                npv_cube.depth(),
                netting_cube.depth(),
                interpretation,
                depth
            )));
        }
        if npv_cube.dates() != netting_cube.dates() || npv_cube.samples() != netting_cube.samples() {
            return Err(XvaError::dimension_mismatch(
                "NPV and netting cubes have different dates or samples",
            ));
        }
        if scenario_data.dates() != netting_cube.dates()
            || scenario_data.samples() != netting_cube.samples()
        {
            return Err(XvaError::dimension_mismatch(
                "scenario data does not match the netting cube",
            ));
        }
        Ok(())
    }

    /// Trade-to-netting mapping and counterparty per netting set, derived
    /// from cube ids and the portfolio.
    fn netting_structure(
        &self,
        npv_cube: &ValuationCube,
        netting_cube: &ValuationCube,
    ) -> Result<(Vec<usize>, Vec<CounterpartyId>)> {
        let netting_ids = netting_cube.ids();
        let trade_to_netting = npv_cube
            .ids()
            .iter()
            .map(|id| {
                let trade = self
                    .portfolio
                    .trade(&TradeId::new(id.as_str()))
                    .ok_or_else(|| XvaError::UnknownTrade(id.clone()))?;
                netting_ids
                    .iter()
                    .position(|n| n == trade.netting_set_id().as_str())
                    .ok_or_else(|| {
                        XvaError::dimension_mismatch(format!(
                            "netting set {} of trade {} is not in the netting cube",
                            trade.netting_set_id(),
                            id
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let counterparties = netting_ids
            .iter()
            .map(|n| {
                let netting_set_id = NettingSetId::new(n.as_str());
                match self.config.netting_sets.get(&netting_set_id) {
                    Some(definition) => definition.counterparty.clone(),
                    None => self
                        .portfolio
                        .trades()
                        .iter()
                        .find(|t| t.netting_set_id() == &netting_set_id)
                        .map(|t| t.counterparty_id().clone())
                        .unwrap_or_default(),
                }
            })
            .collect();

        Ok((trade_to_netting, counterparties))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::test_support::d;
    use crate::instruments::InterestRateSwap;
    use crate::portfolio::Trade;
    use std::sync::Mutex;

    use crate::instruments::FxForward;
    use crate::postprocess::PostProcessSettings;
    use approx::assert_relative_eq;
    use xva_models::builder::hull_white_sigma_for_normal_vol;
    use xva_models::model::{FxModelData, IrCalibrationTarget, IrModelData};
    use xva_models::{
        CrossAssetModelData, DayCount, ModelError, ScenarioGeneratorData, SimMarketParameters, Tenor,
    };

    fn market() -> TodaysMarket {
        TodaysMarket::new(d(2024, 1, 2), Currency::USD, DayCount::Act365F)
            .with_zero_rate(Currency::USD, 0.03)
            .with_zero_rate(Currency::EUR, 0.02)
            .with_fx_spot(Currency::EUR, 1.1)
    }

    fn config() -> XvaRunnerConfig {
        let mut config = XvaRunnerConfig::new(d(2024, 1, 2), Currency::USD);
        config.model = CrossAssetModelData {
            ir: vec![
                IrModelData {
                    currency: Currency::USD,
                    mean_reversion: 0.03,
                    sigma: 0.01,
                    calibration: None,
                },
                IrModelData {
                    currency: Currency::EUR,
                    mean_reversion: 0.03,
                    sigma: 0.01,
                    calibration: None,
                },
            ],
            fx: vec![FxModelData {
                currency: Currency::EUR,
                sigma: 0.1,
            }],
            correlations: vec![],
        };
        config.scenario_generator.grid = vec!["6M".parse::<Tenor>().unwrap(), "1Y".parse().unwrap()];
        config.scenario_generator.samples = 20;
        config.engine_data = config
            .engine_data
            .with_engine("InterestRateSwap", "DiscountedCashflows");
        config.analytics.insert("dim".to_string(), false);
        config.analytics.insert("mva".to_string(), false);
        config
    }

    fn portfolio() -> Arc<Portfolio> {
        let mut portfolio = Portfolio::new();
        portfolio
            .add(Trade::new(
                "SWAP1",
                InterestRateSwap::new(Currency::USD, 1_000_000.0, 0.03, d(2024, 1, 2), d(2026, 1, 2)),
                "CP_A",
                "NS_A",
            ))
            .unwrap();
        Arc::new(portfolio)
    }

    #[derive(Debug, Default)]
    struct CountingExtension(std::sync::atomic::AtomicUsize);

    impl PricingExtension for CountingExtension {
        fn name(&self) -> &str {
            "counting"
        }

        fn reset(&self) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn test_accessors_before_stages() {
        let runner = XvaRunner::new(config(), portfolio());
        assert_eq!(runner.stage(), Stage::Idle);
        assert!(matches!(runner.model(), Err(XvaError::Precondition(_))));
        assert!(matches!(runner.npv_cube(), Err(XvaError::Precondition(_))));
        assert!(matches!(runner.netting_cube(), Err(XvaError::Precondition(_))));
        assert!(matches!(runner.aggregation_scenario_data(), Err(XvaError::Precondition(_))));
        assert!(matches!(runner.report(), Err(XvaError::Precondition(_))));
        assert!(matches!(runner.dim_results(), Err(XvaError::Precondition(_))));
        assert!(matches!(runner.calibration_failures(), Err(XvaError::Precondition(_))));
    }

    #[test]
    fn test_build_cube_before_prepare() {
        let mut runner = XvaRunner::new(config(), portfolio());
        assert!(matches!(runner.build_cube(None, false), Err(XvaError::Precondition(_))));
    }

    #[test]
    fn test_asof_mismatch() {
        let mut runner = XvaRunner::new(config(), portfolio());
        let other = TodaysMarket::new(d(2024, 1, 3), Currency::USD, DayCount::Act365F)
            .with_zero_rate(Currency::USD, 0.03);
        assert!(matches!(
            runner.prepare(&other, false, None),
            Err(XvaError::Configuration(_))
        ));
        assert_eq!(runner.stage(), Stage::Idle);
    }

    #[test]
    fn test_projection_unsupported() {
        let mut runner = XvaRunner::new(config(), portfolio());
        let err = runner
            .prepare(&market(), false, Some(&[Currency::USD]))
            .unwrap_err();
        assert!(matches!(err, XvaError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_prepare_resets_extensions() {
        let extension = Arc::new(CountingExtension::default());
        let mut runner = XvaRunner::new(config(), portfolio())
            .with_extensions(vec![Arc::clone(&extension) as Arc<dyn PricingExtension>]);
        runner.prepare(&market(), false, None).unwrap();
        runner.prepare(&market(), false, None).unwrap();
        assert_eq!(extension.0.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(runner.stage(), Stage::Prepared);
        assert_eq!(runner.scenario_generator().unwrap().samples(), 20);
    }

    #[test]
    fn test_calibration_failure_recorded_or_raised() {
        let mut bad = config();
        bad.model.ir[1].calibration = Some(IrCalibrationTarget {
            normal_vol: -0.01,
            expiry: 1.0,
        });

        let mut strict = XvaRunner::new(bad.clone(), portfolio());
        assert!(matches!(
            strict.prepare(&market(), false, None),
            Err(XvaError::ModelCalibration(_))
        ));

        let mut lenient = XvaRunner::new(bad, portfolio());
        lenient.prepare(&market(), true, None).unwrap();
        let failures = lenient.calibration_failures().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].component, "IR:EUR");
    }

    #[test]
    fn test_unknown_trade_before_allocation() {
        let mut runner = XvaRunner::new(config(), portfolio());
        runner.prepare(&market(), false, None).unwrap();
        let err = runner
            .build_cube(Some(&[TradeId::new("NOPE")]), false)
            .unwrap_err();
        assert!(matches!(err, XvaError::UnknownTrade(ref id) if id == "NOPE"));
        assert!(runner.npv_cube().is_err());
        assert_eq!(runner.stage(), Stage::Prepared);
    }

    #[test]
    fn test_dim_results_when_not_requested() {
        let mut runner = XvaRunner::new(config(), portfolio());
        runner.run(&market(), false).unwrap();
        assert_eq!(runner.stage(), Stage::PostProcessed);
        assert!(matches!(runner.dim_results(), Err(XvaError::Precondition(_))));
        assert!(runner.report().unwrap().netting_set("NS_A").is_some());
    }

    #[test]
    fn test_post_processor_rejects_wrong_depth() {
        let mut runner = XvaRunner::new(config(), portfolio());
        runner.prepare(&market(), false, None).unwrap();
        runner.build_cube(None, false).unwrap();
        let cube = runner.npv_cube().unwrap();
        let wrong = Arc::new(
            ValuationCube::allocate(
                cube.asof(),
                cube.ids().to_vec(),
                cube.dates().to_vec(),
                cube.samples(),
                cube.depth() + 1,
                0.0,
            )
            .unwrap(),
        );
        let netting = Arc::clone(runner.netting_cube().unwrap());
        let data = Arc::clone(runner.aggregation_scenario_data().unwrap());
        let err = runner
            .generate_post_processor(&market(), wrong, netting, data, false)
            .unwrap_err();
        assert!(matches!(err, XvaError::DimensionMismatch(_)));
    }

    /// Keeps every currency.
    #[derive(Debug)]
    struct IdentityProjection;

    impl ScenarioProjection for IdentityProjection {
        fn project_sim_market_parameters(
            &self,
            parameters: &SimMarketParameters,
            _currencies: &[Currency],
        ) -> std::result::Result<SimMarketParameters, ModelError> {
            Ok(parameters.clone())
        }

        fn projected_scenario_generator(
            &self,
            data: &ScenarioGeneratorData,
            _currencies: &[Currency],
        ) -> std::result::Result<ScenarioGeneratorData, ModelError> {
            Ok(data.clone())
        }
    }

    /// Records the model it was handed, then runs the standard post-processor.
    #[derive(Debug, Default)]
    struct ModelRecorder(Arc<Mutex<Option<(bool, f64)>>>);

    impl PostProcessor for ModelRecorder {
        fn process(&self, input: &PostProcessInput<'_>, settings: &PostProcessSettings) -> Result<XvaReport> {
            let usd = &input.model.ir_factors()[0];
            *self.0.lock().unwrap() = Some((input.model.is_calibrated(), usd.sigma()));
            PostProcess::new().process(input, settings)
        }
    }

    #[test]
    fn test_projected_run_calibrates_before_post_processing() {
        let mut config = config();
        config.model.ir[0].calibration = Some(IrCalibrationTarget {
            normal_vol: 0.008,
            expiry: 1.0,
        });
        let seen = Arc::new(Mutex::new(None));
        let mut runner = XvaRunner::new(config, portfolio())
            .with_projection(Box::new(IdentityProjection))
            .with_post_processor(Box::new(ModelRecorder(Arc::clone(&seen))));

        runner
            .prepare(&market(), false, Some(&[Currency::USD, Currency::EUR]))
            .unwrap();
        let model = runner.model().unwrap();
        assert!(!model.is_calibrated());
        assert_eq!(model.ir_factors()[0].sigma(), 0.01);

        runner.build_cube(None, false).unwrap();
        let npv = Arc::clone(runner.npv_cube().unwrap());
        let netting = Arc::clone(runner.netting_cube().unwrap());
        let data = Arc::clone(runner.aggregation_scenario_data().unwrap());
        runner
            .generate_post_processor(&market(), npv, netting, data, false)
            .unwrap();

        let expected = hull_white_sigma_for_normal_vol(0.03, 0.008, 1.0).unwrap();
        assert!(runner.model().unwrap().is_calibrated());
        assert_relative_eq!(runner.model().unwrap().ir_factors()[0].sigma(), expected);
        let recorded = *seen.lock().unwrap();
        let (calibrated, sigma) = recorded.expect("post-processor ran");
        assert!(calibrated);
        assert_relative_eq!(sigma, expected);
        assert_eq!(runner.stage(), Stage::PostProcessed);
    }

    #[test]
    fn test_external_cubes_drop_previous_failures() {
        let mut with_unpriced = Portfolio::new();
        with_unpriced
            .add(Trade::new(
                "SWAP1",
                InterestRateSwap::new(Currency::USD, 1_000_000.0, 0.03, d(2024, 1, 2), d(2026, 1, 2)),
                "CP_A",
                "NS_A",
            ))
            .unwrap();
        // no FxForward engine is configured
        with_unpriced
            .add(Trade::new(
                "FXF1",
                FxForward::new(Currency::EUR, 1e6, Currency::USD, 1.1e6, d(2025, 1, 2)),
                "CP_A",
                "NS_A",
            ))
            .unwrap();
        let mut runner = XvaRunner::new(config(), Arc::new(with_unpriced));
        runner.prepare(&market(), true, None).unwrap();
        runner.build_cube(None, true).unwrap();
        assert_eq!(runner.trade_failures().unwrap().len(), 1);

        let own_npv = Arc::clone(runner.npv_cube().unwrap());
        let own_netting = Arc::clone(runner.netting_cube().unwrap());
        let own_data = Arc::clone(runner.aggregation_scenario_data().unwrap());
        runner
            .generate_post_processor(&market(), own_npv, own_netting, own_data, true)
            .unwrap();
        assert_eq!(runner.trade_failures().unwrap().len(), 1);

        let mut reference = XvaRunner::new(config(), portfolio());
        reference.prepare(&market(), false, None).unwrap();
        reference.build_cube(None, false).unwrap();
        let npv = Arc::clone(reference.npv_cube().unwrap());
        let netting = Arc::clone(reference.netting_cube().unwrap());
        let data = Arc::clone(reference.aggregation_scenario_data().unwrap());
        runner
            .generate_post_processor(&market(), Arc::clone(&npv), netting, data, true)
            .unwrap();
        assert!(runner.trade_failures().unwrap().is_empty());
        assert!(runner.path_failures().unwrap().is_empty());
        assert!(Arc::ptr_eq(runner.npv_cube().unwrap(), &npv));
    }

    #[test]
    fn test_failed_rebuild_discards_previous_cubes() {
        let mut runner = XvaRunner::new(config(), portfolio());
        runner.run(&market(), false).unwrap();
        assert_eq!(runner.stage(), Stage::PostProcessed);

        let err = runner
            .build_cube(Some(&[TradeId::new("NOPE")]), false)
            .unwrap_err();
        assert!(matches!(err, XvaError::UnknownTrade(_)));
        assert_eq!(runner.stage(), Stage::Prepared);
        assert!(matches!(runner.npv_cube(), Err(XvaError::Precondition(_))));
        assert!(matches!(runner.report(), Err(XvaError::Precondition(_))));
    }
}
