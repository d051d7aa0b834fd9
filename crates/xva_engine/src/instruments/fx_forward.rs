//! Outright FX forward.

use std::sync::Arc;

use chrono::NaiveDate;
use xva_models::{Currency, SimulatedMarket};

use super::{check_buildable, finite, BuildContext, Instrument, PricedInstrument};
use crate::error::InstrumentError;

/// Exchange of two currency amounts on a single date.
#[derive(Clone, Debug, PartialEq)]
pub struct FxForward {
    bought: Currency,
    bought_amount: f64,
    sold: Currency,
    sold_amount: f64,
    maturity: NaiveDate,
}

impl FxForward {
    /// Creates a forward buying `bought_amount` of `bought` against
    /// `sold_amount` of `sold` at `maturity`.
    pub fn new(
        bought: Currency,
        bought_amount: f64,
        sold: Currency,
        sold_amount: f64,
        maturity: NaiveDate,
    ) -> Self {
        Self {
            bought,
            bought_amount,
            sold,
            sold_amount,
            maturity,
        }
    }

    /// Strike in units of sold currency per bought currency.
    #[inline]
    pub fn strike(&self) -> f64 {
        self.sold_amount / self.bought_amount
    }
}

impl Instrument for FxForward {
    fn product_type(&self) -> &'static str {
        "FxForward"
    }

    fn currencies(&self) -> Vec<Currency> {
        vec![self.bought, self.sold]
    }

    fn maturity(&self) -> NaiveDate {
        self.maturity
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Arc<dyn PricedInstrument>, InstrumentError> {
        if self.bought == self.sold {
            return Err(InstrumentError::InvalidTrade(format!(
                "bought and sold currency are both {}",
                self.bought
            )));
        }
        if !(self.bought_amount > 0.0 && self.sold_amount > 0.0) {
            return Err(InstrumentError::InvalidTrade(
                "amounts must be positive".to_string(),
            ));
        }
        check_buildable(self, ctx)?;
        Ok(Arc::new(self.clone()))
    }
}

impl PricedInstrument for FxForward {
    fn maturity(&self) -> NaiveDate {
        self.maturity
    }

    fn npv(&self, market: &dyn SimulatedMarket) -> Result<f64, InstrumentError> {
        if self.maturity <= market.evaluation_date() {
            return Ok(0.0);
        }
        let bought = self.bought_amount
            * market.fx_spot(self.bought)?
            * market.discount(self.bought, self.maturity)?;
        let sold =
            self.sold_amount * market.fx_spot(self.sold)? * market.discount(self.sold, self.maturity)?;
        finite(bought - sold, "fx forward npv")
    }

    fn cashflows(
        &self,
        market: &dyn SimulatedMarket,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<f64, InstrumentError> {
        if self.maturity <= start || self.maturity > end {
            return Ok(0.0);
        }
        let flow = self.bought_amount * market.fx_spot(self.bought)?
            - self.sold_amount * market.fx_spot(self.sold)?;
        finite(flow, "fx forward cash flow")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_data::{EngineData, ReferenceData};
    use crate::instruments::test_support::{d, flat_market};
    use approx::assert_relative_eq;
    use xva_models::DayCount;

    #[test]
    fn test_npv_today() {
        let market = flat_market(0.04, 0.02, 1.1);
        let engines = EngineData::default().with_engine("FxForward", "Discounting");
        let refdata = ReferenceData::default();
        let ctx = BuildContext {
            engine_data: &engines,
            reference_data: &refdata,
            market: &market,
        };
        let fwd = FxForward::new(Currency::EUR, 1_000.0, Currency::USD, 1_120.0, d(2025, 1, 2));
        let priced = fwd.build(&ctx).unwrap();

        let t = DayCount::Act365F.year_fraction(d(2024, 1, 2), d(2025, 1, 2));
        let expected = 1_000.0 * 1.1 * (-0.02 * t).exp() - 1_120.0 * (-0.04 * t).exp();
        assert_relative_eq!(priced.npv(&market).unwrap(), expected, epsilon = 1e-9);
        assert_relative_eq!(fwd.strike(), 1.12);
    }

    #[test]
    fn test_settlement_flow() {
        let market = flat_market(0.04, 0.02, 1.1);
        let engines = EngineData::default().with_engine("FxForward", "Discounting");
        let refdata = ReferenceData::default();
        let ctx = BuildContext {
            engine_data: &engines,
            reference_data: &refdata,
            market: &market,
        };
        let fwd = FxForward::new(Currency::EUR, 100.0, Currency::USD, 100.0, d(2024, 6, 3));
        let priced = fwd.build(&ctx).unwrap();
        assert_eq!(priced.cashflows(&market, d(2024, 1, 2), d(2024, 6, 2)).unwrap(), 0.0);
        assert_relative_eq!(
            priced.cashflows(&market, d(2024, 6, 2), d(2024, 7, 2)).unwrap(),
            10.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_same_currency_rejected() {
        let market = flat_market(0.04, 0.02, 1.1);
        let engines = EngineData::default().with_engine("FxForward", "Discounting");
        let refdata = ReferenceData::default();
        let ctx = BuildContext {
            engine_data: &engines,
            reference_data: &refdata,
            market: &market,
        };
        let fwd = FxForward::new(Currency::USD, 1.0, Currency::USD, 1.0, d(2025, 1, 2));
        assert!(matches!(fwd.build(&ctx), Err(InstrumentError::InvalidTrade(_))));
    }

    #[test]
    fn test_unsimulated_currency_rejected() {
        let market = flat_market(0.04, 0.02, 1.1);
        let engines = EngineData::default().with_engine("FxForward", "Discounting");
        let refdata = ReferenceData::default();
        let ctx = BuildContext {
            engine_data: &engines,
            reference_data: &refdata,
            market: &market,
        };
        let fwd = FxForward::new(Currency::GBP, 1.0, Currency::USD, 1.3, d(2025, 1, 2));
        assert!(matches!(fwd.build(&ctx), Err(InstrumentError::Market(_))));
    }
}
