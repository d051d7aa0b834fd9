//! Instruments priced on simulated markets.
//!
//! An [`Instrument`] holds trade terms. Building it against the engine
//! configuration and the simulated market yields a [`PricedInstrument`],
//! which is what the valuation engine reprices on every scenario.
//!
//! Values are returned in the base currency of the market, undeflated.

mod fx_forward;
mod swap;

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use xva_models::{Currency, SimulatedMarket};

use crate::engine_data::{EngineData, ReferenceData};
use crate::error::InstrumentError;

pub use fx_forward::FxForward;
pub use swap::InterestRateSwap;

/// Inputs available to an instrument while it is built.
pub struct BuildContext<'a> {
    /// Product type to engine mapping.
    pub engine_data: &'a EngineData,
    /// Opaque reference data.
    pub reference_data: &'a ReferenceData,
    /// Simulated market at today's state.
    pub market: &'a dyn SimulatedMarket,
}

/// Trade terms of a product.
pub trait Instrument: Send + Sync + fmt::Debug {
    /// Product type, matched against [`EngineData`].
    fn product_type(&self) -> &'static str;

    /// Currencies the instrument needs from the simulated market.
    fn currencies(&self) -> Vec<Currency>;

    /// Final payment date.
    fn maturity(&self) -> NaiveDate;

    /// Builds the pricing representation.
    fn build(&self, ctx: &BuildContext<'_>) -> Result<Arc<dyn PricedInstrument>, InstrumentError>;
}

/// Built instrument, ready for repricing.
pub trait PricedInstrument: Send + Sync + fmt::Debug {
    /// Final payment date.
    fn maturity(&self) -> NaiveDate;

    /// Value at the market's evaluation date, in base currency.
    ///
    /// Zero once every payment is at or before the evaluation date.
    fn npv(&self, market: &dyn SimulatedMarket) -> Result<f64, InstrumentError>;

    /// Sum of payments in `(start, end]`, in base currency, at the market's
    /// current state.
    fn cashflows(
        &self,
        market: &dyn SimulatedMarket,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<f64, InstrumentError>;
}

/// Checks shared by every product: engine configured, currencies simulated,
/// not matured.
pub(crate) fn check_buildable(
    instrument: &dyn Instrument,
    ctx: &BuildContext<'_>,
) -> Result<(), InstrumentError> {
    let product = instrument.product_type();
    if ctx.engine_data.engine(product).is_none() {
        return Err(InstrumentError::UnsupportedProduct(product.to_string()));
    }
    let simulated = ctx.market.simulated_currencies();
    for ccy in instrument.currencies() {
        if !simulated.contains(&ccy) {
            return Err(xva_models::MarketError::NotSimulated(ccy).into());
        }
    }
    if instrument.maturity() <= ctx.market.asof() {
        return Err(InstrumentError::InvalidTrade(format!(
            "matured on {} before as-of date {}",
            instrument.maturity(),
            ctx.market.asof()
        )));
    }
    Ok(())
}

pub(crate) fn finite(value: f64, what: &str) -> Result<f64, InstrumentError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(InstrumentError::NonFinite(what.to_string()))
    }
}
