//! Scenario-addressable market used for revaluation.
//!
//! A simulated market is advanced to one scenario at a time. Between advances
//! its discount factors and FX spots are stable, and its evaluation date is
//! explicit state set by the caller.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{MarketError, ModelError};
use crate::grid::ScenarioGeneratorData;
use crate::model::CrossAssetModel;
use crate::scenario::Scenario;
use crate::types::Currency;

/// Currencies the simulated market exposes.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimMarketParameters {
    /// Simulated currencies; empty means every modelled currency.
    #[cfg_attr(feature = "serde", serde(default))]
    pub currencies: Vec<Currency>,
}

/// Market view consumed by instruments during simulation.
pub trait SimulatedMarket: Send {
    /// As-of date of the run.
    fn asof(&self) -> NaiveDate;

    /// Base currency of the market.
    fn base_currency(&self) -> Currency;

    /// Evaluation date used for pricing.
    fn evaluation_date(&self) -> NaiveDate;

    /// Sets the evaluation date.
    fn set_evaluation_date(&mut self, date: NaiveDate);

    /// Moves the market to a scenario and sets the evaluation date to its date.
    fn advance(&mut self, scenario: &Scenario);

    /// Returns to today's market and the as-of evaluation date.
    fn reset(&mut self);

    /// Discount factor from the current market date to `date`.
    fn discount(&self, ccy: Currency, date: NaiveDate) -> Result<f64, MarketError>;

    /// FX spot in base currency per unit of `ccy`.
    fn fx_spot(&self, ccy: Currency) -> Result<f64, MarketError>;

    /// Short rate of a currency.
    fn short_rate(&self, ccy: Currency) -> Result<f64, MarketError>;

    /// Numeraire in base currency.
    fn numeraire(&self) -> f64;

    /// Currencies exposed by this market.
    fn simulated_currencies(&self) -> &[Currency];
}

/// Simulated market driven by a [`CrossAssetModel`].
///
/// Cheap to clone; each parallel worker owns its own clone.
#[derive(Clone, Debug)]
pub struct ScenarioSimMarket {
    model: Arc<CrossAssetModel>,
    currencies: Vec<Currency>,
    scenario: Scenario,
    evaluation_date: NaiveDate,
}

impl ScenarioSimMarket {
    /// Creates a market at today's state.
    ///
    /// # Errors
    ///
    /// `ModelError::MissingCurrency` if a simulated currency is not modelled.
    pub fn new(
        model: Arc<CrossAssetModel>,
        parameters: &SimMarketParameters,
    ) -> Result<Self, ModelError> {
        let currencies = if parameters.currencies.is_empty() {
            model.currencies()
        } else {
            for ccy in &parameters.currencies {
                if model.ir_index(*ccy).is_none() {
                    return Err(ModelError::MissingCurrency(*ccy));
                }
            }
            parameters.currencies.clone()
        };
        let scenario = Scenario::today(&model);
        let evaluation_date = model.asof();
        Ok(Self {
            model,
            currencies,
            scenario,
            evaluation_date,
        })
    }

    /// Model behind the market.
    #[inline]
    pub fn model(&self) -> &Arc<CrossAssetModel> {
        &self.model
    }

    /// Scenario the market is currently at.
    #[inline]
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    fn check_simulated(&self, ccy: Currency) -> Result<(), MarketError> {
        if self.currencies.contains(&ccy) {
            Ok(())
        } else {
            Err(MarketError::NotSimulated(ccy))
        }
    }
}

impl SimulatedMarket for ScenarioSimMarket {
    fn asof(&self) -> NaiveDate {
        self.model.asof()
    }

    fn base_currency(&self) -> Currency {
        self.model.domestic()
    }

    fn evaluation_date(&self) -> NaiveDate {
        self.evaluation_date
    }

    fn set_evaluation_date(&mut self, date: NaiveDate) {
        self.evaluation_date = date;
    }

    fn advance(&mut self, scenario: &Scenario) {
        self.scenario.clone_from(scenario);
        self.evaluation_date = scenario.date();
    }

    fn reset(&mut self) {
        self.scenario = Scenario::today(&self.model);
        self.evaluation_date = self.model.asof();
    }

    fn discount(&self, ccy: Currency, date: NaiveDate) -> Result<f64, MarketError> {
        self.check_simulated(ccy)?;
        let i = self
            .model
            .ir_index(ccy)
            .ok_or(MarketError::MissingCurve(ccy))?;
        let t = self.scenario.time();
        let maturity = self.model.time(date);
        Ok(self.model.ir_factors()[i].zero_bond(t, maturity, self.scenario.ir_states()[i]))
    }

    fn fx_spot(&self, ccy: Currency) -> Result<f64, MarketError> {
        if ccy == self.model.domestic() {
            return Ok(1.0);
        }
        self.check_simulated(ccy)?;
        let j = self
            .model
            .fx_index(ccy)
            .ok_or(MarketError::MissingFxSpot(ccy))?;
        Ok(self.scenario.fx_spots()[j])
    }

    fn short_rate(&self, ccy: Currency) -> Result<f64, MarketError> {
        self.check_simulated(ccy)?;
        let i = self
            .model
            .ir_index(ccy)
            .ok_or(MarketError::MissingCurve(ccy))?;
        Ok(self.scenario.short_rates()[i])
    }

    fn numeraire(&self) -> f64 {
        self.scenario.numeraire()
    }

    fn simulated_currencies(&self) -> &[Currency] {
        &self.currencies
    }
}

/// Capability to restrict a simulation to a subset of currencies.
pub trait ScenarioProjection: Send + Sync {
    /// Projects simulation market parameters onto `currencies`.
    fn project_sim_market_parameters(
        &self,
        parameters: &SimMarketParameters,
        currencies: &[Currency],
    ) -> Result<SimMarketParameters, ModelError>;

    /// Projects scenario generator configuration onto `currencies`.
    fn projected_scenario_generator(
        &self,
        data: &ScenarioGeneratorData,
        currencies: &[Currency],
    ) -> Result<ScenarioGeneratorData, ModelError>;
}

/// Projection capability of the standard edition: always unsupported.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnsupportedProjection;

impl ScenarioProjection for UnsupportedProjection {
    fn project_sim_market_parameters(
        &self,
        _parameters: &SimMarketParameters,
        _currencies: &[Currency],
    ) -> Result<SimMarketParameters, ModelError> {
        Err(ModelError::UnsupportedOperation(
            "projection of simulation market parameters is only available in an extended edition"
                .to_string(),
        ))
    }

    fn projected_scenario_generator(
        &self,
        data: &ScenarioGeneratorData,
        currencies: &[Currency],
    ) -> Result<ScenarioGeneratorData, ModelError> {
        if currencies.is_empty() {
            return Ok(data.clone());
        }
        Err(ModelError::UnsupportedOperation(
            "projected scenario generators are only available in an extended edition".to_string(),
        ))
    }
}
