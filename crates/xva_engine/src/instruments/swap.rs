//! Single-currency fixed versus floating interest rate swap.

use std::sync::Arc;

use chrono::NaiveDate;
use xva_models::types::TenorUnit;
use xva_models::{Currency, DayCount, SimulatedMarket, Tenor};

use super::{check_buildable, finite, BuildContext, Instrument, PricedInstrument};
use crate::error::InstrumentError;

/// Vanilla swap exchanging a fixed rate against the floating rate of the
/// same currency, with identical schedules on both legs.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use xva_engine::instruments::{Instrument, InterestRateSwap};
/// use xva_models::Currency;
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
/// let end = NaiveDate::from_ymd_opt(2029, 1, 2).unwrap();
/// let swap = InterestRateSwap::new(Currency::USD, 10_000_000.0, 0.04, start, end)
///     .with_pay_fixed(false);
///
/// assert_eq!(swap.product_type(), "InterestRateSwap");
/// assert_eq!(swap.maturity(), end);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct InterestRateSwap {
    currency: Currency,
    notional: f64,
    fixed_rate: f64,
    start: NaiveDate,
    maturity: NaiveDate,
    pay_fixed: bool,
    frequency: Tenor,
    day_count: DayCount,
}

impl InterestRateSwap {
    /// Creates a payer swap with semi-annual periods and Act/365F accrual.
    pub fn new(
        currency: Currency,
        notional: f64,
        fixed_rate: f64,
        start: NaiveDate,
        maturity: NaiveDate,
    ) -> Self {
        Self {
            currency,
            notional,
            fixed_rate,
            start,
            maturity,
            pay_fixed: true,
            frequency: Tenor::new(6, TenorUnit::Months),
            day_count: DayCount::Act365F,
        }
    }

    /// Sets the direction: `true` pays fixed and receives floating.
    pub fn with_pay_fixed(mut self, pay_fixed: bool) -> Self {
        self.pay_fixed = pay_fixed;
        self
    }

    /// Sets the payment frequency.
    pub fn with_frequency(mut self, frequency: Tenor) -> Self {
        self.frequency = frequency;
        self
    }

    /// Sets the accrual day count.
    pub fn with_day_count(mut self, day_count: DayCount) -> Self {
        self.day_count = day_count;
        self
    }

    /// Currency of both legs.
    #[inline]
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Notional.
    #[inline]
    pub fn notional(&self) -> f64 {
        self.notional
    }

    /// Fixed rate.
    #[inline]
    pub fn fixed_rate(&self) -> f64 {
        self.fixed_rate
    }

    /// True for a payer swap.
    #[inline]
    pub fn pay_fixed(&self) -> bool {
        self.pay_fixed
    }

    fn schedule(&self) -> Result<Vec<Period>, InstrumentError> {
        if self.start >= self.maturity {
            return Err(InstrumentError::InvalidTrade(format!(
                "start {} is not before maturity {}",
                self.start, self.maturity
            )));
        }
        let mut periods = Vec::new();
        let mut period_start = self.start;
        let mut n = 1;
        while period_start < self.maturity {
            let step = Tenor::new(self.frequency.length() * n, self.frequency.unit());
            let period_end = step
                .advance(self.start)
                .ok_or_else(|| InstrumentError::InvalidTrade("schedule out of range".to_string()))?
                .min(self.maturity);
            periods.push(Period {
                start: period_start,
                end: period_end,
                accrual: self.day_count.year_fraction(period_start, period_end),
            });
            period_start = period_end;
            n += 1;
        }
        Ok(periods)
    }
}

impl Instrument for InterestRateSwap {
    fn product_type(&self) -> &'static str {
        "InterestRateSwap"
    }

    fn currencies(&self) -> Vec<Currency> {
        vec![self.currency]
    }

    fn maturity(&self) -> NaiveDate {
        self.maturity
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Arc<dyn PricedInstrument>, InstrumentError> {
        check_buildable(self, ctx)?;
        if !(self.notional > 0.0) {
            return Err(InstrumentError::InvalidTrade(format!(
                "notional must be positive, got {}",
                self.notional
            )));
        }
        Ok(Arc::new(SwapPricer {
            currency: self.currency,
            notional: self.notional,
            fixed_rate: self.fixed_rate,
            sign: if self.pay_fixed { 1.0 } else { -1.0 },
            periods: self.schedule()?,
            maturity: self.maturity,
        }))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Period {
    start: NaiveDate,
    end: NaiveDate,
    accrual: f64,
}

/// Sign is +1 for receive floating, -1 for receive fixed.
#[derive(Debug)]
struct SwapPricer {
    currency: Currency,
    notional: f64,
    fixed_rate: f64,
    sign: f64,
    periods: Vec<Period>,
    maturity: NaiveDate,
}

impl PricedInstrument for SwapPricer {
    fn maturity(&self) -> NaiveDate {
        self.maturity
    }

    fn npv(&self, market: &dyn SimulatedMarket) -> Result<f64, InstrumentError> {
        let today = market.evaluation_date();
        if self.maturity <= today {
            return Ok(0.0);
        }
        let mut float_leg = 0.0;
        let mut fixed_leg = 0.0;
        for p in self.periods.iter().filter(|p| p.end > today) {
            let df_end = market.discount(self.currency, p.end)?;
            // periods already running pay the forward of their remaining part
            float_leg += market.discount(self.currency, p.start)? - df_end;
            fixed_leg += self.fixed_rate * p.accrual * df_end;
        }
        let local = self.sign * self.notional * (float_leg - fixed_leg);
        finite(local * market.fx_spot(self.currency)?, "swap npv")
    }

    fn cashflows(
        &self,
        market: &dyn SimulatedMarket,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<f64, InstrumentError> {
        let paying: Vec<&Period> = self
            .periods
            .iter()
            .filter(|p| p.end > start && p.end <= end)
            .collect();
        if paying.is_empty() {
            return Ok(0.0);
        }
        // the current short rate stands in for the period fixing
        let fixing = market.short_rate(self.currency)?;
        let local: f64 = paying
            .iter()
            .map(|p| self.sign * self.notional * (fixing - self.fixed_rate) * p.accrual)
            .sum();
        finite(local * market.fx_spot(self.currency)?, "swap cash flow")
    }
}
