//! Valuation calculators: what the engine writes for each trade, date and
//! sample.
//!
//! Every calculator writes values deflated by the numeraire of the scenario
//! they were priced on. Depth slots are constructor arguments; their meaning
//! is owned by [`xva_cube::CubeLayout`].

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use xva_cube::{CubeError, CubeLayout, NettingRule, NpvCube, SampleBlockMut, ValuationCube};
use xva_models::{GridPoint, GridPointKind, SimulatedMarket};

use crate::error::InstrumentError;
use crate::instruments::PricedInstrument;

/// Failure of one calculator call.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CalculationError {
    /// The instrument could not be priced; recoverable per path.
    #[error(transparent)]
    Pricing(#[from] InstrumentError),

    /// Cube write outside the allocated range; always fatal.
    #[error(transparent)]
    Index(#[from] CubeError),
}

/// Computes and stores one kind of value.
pub trait ValuationCalculator: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Depth slots written by the calculator.
    fn slots(&self) -> Vec<usize>;

    /// How the written slots combine into a netting cube.
    fn netting_rule(&self) -> NettingRule {
        NettingRule::Sum
    }

    /// Writes the values of trade `trade` for one path step into `block`.
    ///
    /// `market` has already been advanced to the step's scenario.
    fn calculate(
        &self,
        trade: usize,
        instrument: &dyn PricedInstrument,
        market: &dyn SimulatedMarket,
        point: &GridPoint,
        valuation_dates: &[NaiveDate],
        block: &mut SampleBlockMut<'_>,
    ) -> Result<(), CalculationError>;

    /// Writes today's values of trade `trade` into the cube's t0 slots.
    fn calculate_t0(
        &self,
        trade: usize,
        instrument: &dyn PricedInstrument,
        market: &dyn SimulatedMarket,
        valuation_dates: &[NaiveDate],
        cube: &mut ValuationCube,
    ) -> Result<(), CalculationError>;
}

fn deflated_npv(
    instrument: &dyn PricedInstrument,
    market: &dyn SimulatedMarket,
) -> Result<f64, InstrumentError> {
    Ok(instrument.npv(market)? / market.numeraire())
}

/// Stores the deflated NPV on valuation dates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NpvCalculator {
    index: usize,
}

impl NpvCalculator {
    /// Creates a calculator writing to depth slot `index`.
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl ValuationCalculator for NpvCalculator {
    fn name(&self) -> &'static str {
        "NPV"
    }

    fn slots(&self) -> Vec<usize> {
        vec![self.index]
    }

    fn calculate(
        &self,
        trade: usize,
        instrument: &dyn PricedInstrument,
        market: &dyn SimulatedMarket,
        point: &GridPoint,
        _valuation_dates: &[NaiveDate],
        block: &mut SampleBlockMut<'_>,
    ) -> Result<(), CalculationError> {
        if point.kind != GridPointKind::Valuation {
            return Ok(());
        }
        let value = deflated_npv(instrument, market)?;
        block.set(trade, point.valuation_index, self.index, value)?;
        Ok(())
    }

    fn calculate_t0(
        &self,
        trade: usize,
        instrument: &dyn PricedInstrument,
        market: &dyn SimulatedMarket,
        _valuation_dates: &[NaiveDate],
        cube: &mut ValuationCube,
    ) -> Result<(), CalculationError> {
        let value = deflated_npv(instrument, market)?;
        cube.set_t0(trade, self.index, value)?;
        Ok(())
    }
}

/// Stores the deflated cash flows paid after each valuation date up to and
/// including the next one. The last date has no window and stores zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CashflowCalculator {
    index: usize,
}

impl CashflowCalculator {
    /// Creates a calculator writing to depth slot `index`.
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl ValuationCalculator for CashflowCalculator {
    fn name(&self) -> &'static str {
        "Cashflow"
    }

    fn slots(&self) -> Vec<usize> {
        vec![self.index]
    }

    fn calculate(
        &self,
        trade: usize,
        instrument: &dyn PricedInstrument,
        market: &dyn SimulatedMarket,
        point: &GridPoint,
        valuation_dates: &[NaiveDate],
        block: &mut SampleBlockMut<'_>,
    ) -> Result<(), CalculationError> {
        if point.kind != GridPointKind::Valuation {
            return Ok(());
        }
        let i = point.valuation_index;
        let value = match valuation_dates.get(i + 1) {
            Some(&next) => instrument.cashflows(market, point.date, next)? / market.numeraire(),
            None => 0.0,
        };
        block.set(trade, i, self.index, value)?;
        Ok(())
    }

    fn calculate_t0(
        &self,
        trade: usize,
        instrument: &dyn PricedInstrument,
        market: &dyn SimulatedMarket,
        valuation_dates: &[NaiveDate],
        cube: &mut ValuationCube,
    ) -> Result<(), CalculationError> {
        let value = match valuation_dates.first() {
            Some(&first) => instrument.cashflows(market, market.asof(), first)? / market.numeraire(),
            None => 0.0,
        };
        cube.set_t0(trade, self.index, value)?;
        Ok(())
    }
}

/// Stores the deflated NPV on valuation dates in one slot and on the paired
/// close-out dates in another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MporCalculator {
    default_index: usize,
    close_out_index: usize,
}

impl MporCalculator {
    /// Creates a calculator writing default-date values to `default_index`
    /// and close-out values to `close_out_index`.
    pub fn new(default_index: usize, close_out_index: usize) -> Self {
        Self {
            default_index,
            close_out_index,
        }
    }
}

impl ValuationCalculator for MporCalculator {
    fn name(&self) -> &'static str {
        "MPOR"
    }

    fn slots(&self) -> Vec<usize> {
        vec![self.default_index, self.close_out_index]
    }

    fn calculate(
        &self,
        trade: usize,
        instrument: &dyn PricedInstrument,
        market: &dyn SimulatedMarket,
        point: &GridPoint,
        _valuation_dates: &[NaiveDate],
        block: &mut SampleBlockMut<'_>,
    ) -> Result<(), CalculationError> {
        let slot = match point.kind {
            GridPointKind::Valuation => self.default_index,
            GridPointKind::CloseOut => self.close_out_index,
        };
        let value = deflated_npv(instrument, market)?;
        block.set(trade, point.valuation_index, slot, value)?;
        Ok(())
    }

    fn calculate_t0(
        &self,
        trade: usize,
        instrument: &dyn PricedInstrument,
        market: &dyn SimulatedMarket,
        _valuation_dates: &[NaiveDate],
        cube: &mut ValuationCube,
    ) -> Result<(), CalculationError> {
        let value = deflated_npv(instrument, market)?;
        cube.set_t0(trade, self.default_index, value)?;
        cube.set_t0(trade, self.close_out_index, value)?;
        Ok(())
    }
}

/// Calculators matching a cube layout.
pub fn calculators_for_layout(layout: &CubeLayout) -> Vec<Arc<dyn ValuationCalculator>> {
    let npv = layout.npv_index();
    let mut calcs: Vec<Arc<dyn ValuationCalculator>> = Vec::with_capacity(2);
    match (layout.close_out_index(), layout.flow_index()) {
        (Some(close_out), _) => calcs.push(Arc::new(MporCalculator::new(npv, close_out))),
        (None, flows) => {
            calcs.push(Arc::new(NpvCalculator::new(npv)));
            if let Some(flows) = flows {
                calcs.push(Arc::new(CashflowCalculator::new(flows)));
            }
        }
    }
    calcs
}

/// Netting rule per depth slot, `Sum` where no calculator writes.
pub fn netting_rules(calculators: &[Arc<dyn ValuationCalculator>], depth: usize) -> Vec<NettingRule> {
    let mut rules = vec![NettingRule::Sum; depth];
    for calc in calculators {
        for slot in calc.slots() {
            if let Some(rule) = rules.get_mut(slot) {
                *rule = calc.netting_rule();
            }
        }
    }
    rules
}
