//! Today's market: flat discount curves, FX spots, credit and funding curves.
//!
//! Curve bootstrapping is outside this crate; every curve is a single flat,
//! continuously compounded rate.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::MarketError;
use crate::types::{Currency, DayCount};

/// Flat credit curve: constant hazard rate and recovery.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CreditCurve {
    /// Constant hazard rate (default intensity).
    pub hazard_rate: f64,
    /// Recovery rate in [0, 1].
    pub recovery: f64,
}

impl CreditCurve {
    /// Loss given default.
    #[inline]
    pub fn lgd(&self) -> f64 {
        1.0 - self.recovery
    }

    /// Survival probability to time `t`.
    #[inline]
    pub fn survival_probability(&self, t: f64) -> f64 {
        (-self.hazard_rate * t.max(0.0)).exp()
    }

    /// Default probability in `(t1, t2]`.
    #[inline]
    pub fn marginal_default_probability(&self, t1: f64, t2: f64) -> f64 {
        self.survival_probability(t1) - self.survival_probability(t2)
    }
}

/// Serialisable description of today's market.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TodaysMarketData {
    /// Flat zero rates.
    #[cfg_attr(feature = "serde", serde(default))]
    pub zero_rates: Vec<ZeroRateQuote>,
    /// FX spots, quoted as base currency per unit of foreign currency.
    #[cfg_attr(feature = "serde", serde(default))]
    pub fx_spots: Vec<FxSpotQuote>,
    /// Credit curves by name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub credit_curves: Vec<NamedCreditCurve>,
    /// Funding spread curves by name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub spread_curves: Vec<NamedSpread>,
}

/// Flat zero rate for a currency.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZeroRateQuote {
    /// Currency.
    pub currency: Currency,
    /// Continuously compounded rate.
    pub rate: f64,
}

/// FX spot quote against base.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FxSpotQuote {
    /// Foreign currency.
    pub currency: Currency,
    /// Units of base per unit of `currency`.
    pub spot: f64,
}

/// Credit curve with its name.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NamedCreditCurve {
    /// Curve name (counterparty or own name).
    pub name: String,
    /// Constant hazard rate.
    pub hazard_rate: f64,
    /// Recovery rate.
    pub recovery: f64,
}

/// Funding spread with its name.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NamedSpread {
    /// Curve name.
    pub name: String,
    /// Spread over the discount curve.
    pub spread: f64,
}

/// Market as of the valuation date.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use xva_models::market::TodaysMarket;
/// use xva_models::types::{Currency, DayCount};
///
/// let asof = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
/// let market = TodaysMarket::new(asof, Currency::USD, DayCount::Act365F)
///     .with_zero_rate(Currency::USD, 0.04)
///     .with_zero_rate(Currency::EUR, 0.03)
///     .with_fx_spot(Currency::EUR, 1.10);
///
/// assert_eq!(market.fx_spot(Currency::USD).unwrap(), 1.0);
/// assert!((market.discount(Currency::USD, 1.0).unwrap() - (-0.04f64).exp()).abs() < 1e-15);
/// ```
#[derive(Clone, Debug)]
pub struct TodaysMarket {
    asof: NaiveDate,
    base: Currency,
    day_count: DayCount,
    zero_rates: HashMap<Currency, f64>,
    fx_spots: HashMap<Currency, f64>,
    credit_curves: HashMap<String, CreditCurve>,
    spread_curves: HashMap<String, f64>,
}

impl TodaysMarket {
    /// Creates an empty market.
    pub fn new(asof: NaiveDate, base: Currency, day_count: DayCount) -> Self {
        Self {
            asof,
            base,
            day_count,
            zero_rates: HashMap::new(),
            fx_spots: HashMap::new(),
            credit_curves: HashMap::new(),
            spread_curves: HashMap::new(),
        }
    }

    /// Builds a market from its serialised description.
    ///
    /// # Errors
    ///
    /// `MarketError::InvalidData` for non-positive FX spots, negative hazard
    /// rates or recoveries outside [0, 1].
    pub fn from_data(
        asof: NaiveDate,
        base: Currency,
        day_count: DayCount,
        data: &TodaysMarketData,
    ) -> Result<Self, MarketError> {
        let mut market = Self::new(asof, base, day_count);
        for q in &data.zero_rates {
            market.zero_rates.insert(q.currency, q.rate);
        }
        for q in &data.fx_spots {
            if q.spot <= 0.0 {
                return Err(MarketError::InvalidData(format!(
                    "FX spot for {} must be positive, got {}",
                    q.currency, q.spot
                )));
            }
            market.fx_spots.insert(q.currency, q.spot);
        }
        for c in &data.credit_curves {
            if c.hazard_rate < 0.0 || !(0.0..=1.0).contains(&c.recovery) {
                return Err(MarketError::InvalidData(format!(
                    "credit curve {}: hazard rate {} / recovery {}",
                    c.name, c.hazard_rate, c.recovery
                )));
            }
            market.credit_curves.insert(
                c.name.clone(),
                CreditCurve {
                    hazard_rate: c.hazard_rate,
                    recovery: c.recovery,
                },
            );
        }
        for s in &data.spread_curves {
            market.spread_curves.insert(s.name.clone(), s.spread);
        }
        Ok(market)
    }

    /// Sets a flat zero rate.
    pub fn with_zero_rate(mut self, ccy: Currency, rate: f64) -> Self {
        self.zero_rates.insert(ccy, rate);
        self
    }

    /// Sets an FX spot (base per unit of `ccy`).
    pub fn with_fx_spot(mut self, ccy: Currency, spot: f64) -> Self {
        self.fx_spots.insert(ccy, spot);
        self
    }

    /// Adds a credit curve.
    pub fn with_credit_curve(mut self, name: impl Into<String>, curve: CreditCurve) -> Self {
        self.credit_curves.insert(name.into(), curve);
        self
    }

    /// Adds a funding spread curve.
    pub fn with_spread_curve(mut self, name: impl Into<String>, spread: f64) -> Self {
        self.spread_curves.insert(name.into(), spread);
        self
    }

    /// As-of date.
    #[inline]
    pub fn asof(&self) -> NaiveDate {
        self.asof
    }

    /// Base (reporting) currency.
    #[inline]
    pub fn base_currency(&self) -> Currency {
        self.base
    }

    /// Day count of model time.
    #[inline]
    pub fn day_count(&self) -> DayCount {
        self.day_count
    }

    /// Model time of `date`.
    #[inline]
    pub fn time(&self, date: NaiveDate) -> f64 {
        self.day_count.year_fraction(self.asof, date)
    }

    /// Flat zero rate of a currency.
    pub fn zero_rate(&self, ccy: Currency) -> Result<f64, MarketError> {
        self.zero_rates
            .get(&ccy)
            .copied()
            .ok_or(MarketError::MissingCurve(ccy))
    }

    /// Discount factor to time `t`.
    pub fn discount(&self, ccy: Currency, t: f64) -> Result<f64, MarketError> {
        Ok((-self.zero_rate(ccy)? * t).exp())
    }

    /// FX spot of `ccy` in base currency; 1 for the base itself.
    pub fn fx_spot(&self, ccy: Currency) -> Result<f64, MarketError> {
        if ccy == self.base {
            return Ok(1.0);
        }
        self.fx_spots
            .get(&ccy)
            .copied()
            .ok_or(MarketError::MissingFxSpot(ccy))
    }

    /// Credit curve by name.
    pub fn credit_curve(&self, name: &str) -> Result<CreditCurve, MarketError> {
        self.credit_curves
            .get(name)
            .copied()
            .ok_or_else(|| MarketError::MissingCreditCurve(name.to_string()))
    }

    /// Funding spread by name.
    pub fn spread(&self, name: &str) -> Result<f64, MarketError> {
        self.spread_curves
            .get(name)
            .copied()
            .ok_or_else(|| MarketError::MissingSpreadCurve(name.to_string()))
    }
}
