//! Cross-asset model: one Hull-White factor per currency and one lognormal
//! FX factor per foreign currency, driven by correlated Brownian motions.
//!
//! # Rate factor
//!
//! The short rate is split into a zero-mean Ornstein-Uhlenbeck state and a
//! deterministic shift fitted to today's flat curve:
//!
//! ```text
//! dx = -a x dt + σ dW,   r(t) = x(t) + f(0,t) + σ²/(2a²) (1 - e^{-at})²
//! ```
//!
//! Zero bonds are affine in the state:
//!
//! ```text
//! P(t,T) = P(0,T)/P(0,t) · exp(-B x - B σ²/(2a²)(1 - e^{-at})² - σ²/(4a)(1 - e^{-2at}) B²)
//! B(t,T) = (1 - e^{-a(T-t)}) / a
//! ```
//!
//! # FX factor
//!
//! `d ln S = (r_d - r_f - σ²/2) dt + σ dW`, with `S` in domestic units per
//! unit of foreign currency.

use chrono::NaiveDate;

use crate::correlation::{CholeskyFactor, FactorId};
use crate::error::ModelError;
use crate::types::{Currency, DayCount};

/// Hull-White calibration target: a normal volatility at an expiry.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IrCalibrationTarget {
    /// Target normal (absolute) volatility of the short rate.
    pub normal_vol: f64,
    /// Expiry in years at which the variance is matched.
    pub expiry: f64,
}

/// Parameters of one rate factor.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IrModelData {
    /// Currency.
    pub currency: Currency,
    /// Mean reversion speed `a` (must be positive).
    pub mean_reversion: f64,
    /// Volatility `σ`, used as is when the factor is not calibrated.
    pub sigma: f64,
    /// Optional calibration target replacing `sigma`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub calibration: Option<IrCalibrationTarget>,
}

/// Parameters of one FX factor.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FxModelData {
    /// Foreign currency.
    pub currency: Currency,
    /// Lognormal volatility.
    pub sigma: f64,
}

/// Pairwise factor correlation, factors named as `IR:USD` or `FX:EUR`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CorrelationEntry {
    /// First factor.
    pub factor1: String,
    /// Second factor.
    pub factor2: String,
    /// Correlation.
    pub value: f64,
}

/// Model configuration.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CrossAssetModelData {
    /// Rate factors; the domestic currency must be present.
    #[cfg_attr(feature = "serde", serde(default))]
    pub ir: Vec<IrModelData>,
    /// FX factors for foreign currencies.
    #[cfg_attr(feature = "serde", serde(default))]
    pub fx: Vec<FxModelData>,
    /// Non-zero correlations.
    #[cfg_attr(feature = "serde", serde(default))]
    pub correlations: Vec<CorrelationEntry>,
}

impl CrossAssetModelData {
    /// Currencies with a rate factor, in configuration order.
    pub fn currencies(&self) -> Vec<Currency> {
        self.ir.iter().map(|ir| ir.currency).collect()
    }

    /// Factor ids in model order: rate factors, then FX factors.
    pub fn factors(&self) -> Vec<FactorId> {
        self.ir
            .iter()
            .map(|ir| FactorId::Ir(ir.currency))
            .chain(self.fx.iter().map(|fx| FactorId::Fx(fx.currency)))
            .collect()
    }
}

/// Hull-White factor with a flat initial curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HullWhiteFactor {
    currency: Currency,
    mean_reversion: f64,
    sigma: f64,
    zero_rate: f64,
}

impl HullWhiteFactor {
    /// Creates a factor.
    pub fn new(
        currency: Currency,
        mean_reversion: f64,
        sigma: f64,
        zero_rate: f64,
    ) -> Result<Self, ModelError> {
        if !(mean_reversion > 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "mean reversion of IR:{} must be positive, got {}",
                currency, mean_reversion
            )));
        }
        if !(sigma >= 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "sigma of IR:{} must be non-negative, got {}",
                currency, sigma
            )));
        }
        Ok(Self {
            currency,
            mean_reversion,
            sigma,
            zero_rate,
        })
    }

    /// Currency.
    #[inline]
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Mean reversion `a`.
    #[inline]
    pub fn mean_reversion(&self) -> f64 {
        self.mean_reversion
    }

    /// Volatility `σ`.
    #[inline]
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Flat zero rate of the initial curve.
    #[inline]
    pub fn zero_rate(&self) -> f64 {
        self.zero_rate
    }

    /// Initial discount factor `P(0,t)`.
    #[inline]
    pub fn initial_discount(&self, t: f64) -> f64 {
        (-self.zero_rate * t).exp()
    }

    /// `B(t,T)`.
    #[inline]
    pub fn b(&self, tau: f64) -> f64 {
        (1.0 - (-self.mean_reversion * tau).exp()) / self.mean_reversion
    }

    /// Deterministic part of the short rate at `t`.
    #[inline]
    pub fn shift(&self, t: f64) -> f64 {
        let a = self.mean_reversion;
        let e = 1.0 - (-a * t).exp();
        self.zero_rate + self.sigma * self.sigma / (2.0 * a * a) * e * e
    }

    /// Short rate at `t` given state `x`.
    #[inline]
    pub fn short_rate(&self, t: f64, x: f64) -> f64 {
        x + self.shift(t)
    }

    /// Exact OU transition over `dt`: decay factor and standard deviation.
    #[inline]
    pub fn transition(&self, dt: f64) -> (f64, f64) {
        let a = self.mean_reversion;
        let decay = (-a * dt).exp();
        let var = self.sigma * self.sigma * (1.0 - (-2.0 * a * dt).exp()) / (2.0 * a);
        (decay, var.max(0.0).sqrt())
    }

    /// Zero bond `P(t,T)` given state `x` at `t`; 1 for `T <= t`.
    pub fn zero_bond(&self, t: f64, maturity: f64, x: f64) -> f64 {
        if maturity <= t {
            return 1.0;
        }
        let a = self.mean_reversion;
        let s2 = self.sigma * self.sigma;
        let b = self.b(maturity - t);
        let e = 1.0 - (-a * t).exp();
        let convexity = b * s2 / (2.0 * a * a) * e * e + s2 / (4.0 * a) * (1.0 - (-2.0 * a * t).exp()) * b * b;
        self.initial_discount(maturity) / self.initial_discount(t) * (-b * x - convexity).exp()
    }
}

/// Lognormal FX factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FxFactor {
    currency: Currency,
    sigma: f64,
    spot: f64,
}

impl FxFactor {
    /// Creates a factor.
    pub fn new(currency: Currency, sigma: f64, spot: f64) -> Result<Self, ModelError> {
        if !(sigma >= 0.0) || !(spot > 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "FX:{} needs sigma >= 0 and spot > 0, got sigma {} spot {}",
                currency, sigma, spot
            )));
        }
        Ok(Self {
            currency,
            sigma,
            spot,
        })
    }

    /// Foreign currency.
    #[inline]
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Volatility.
    #[inline]
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Today's spot.
    #[inline]
    pub fn spot(&self) -> f64 {
        self.spot
    }
}

/// Calibrated cross-asset model. Immutable after construction and shared
/// through `Arc`.
#[derive(Clone, Debug)]
pub struct CrossAssetModel {
    asof: NaiveDate,
    day_count: DayCount,
    domestic: Currency,
    ir: Vec<HullWhiteFactor>,
    fx: Vec<FxFactor>,
    cholesky: CholeskyFactor,
    calibrated: bool,
}

impl CrossAssetModel {
    /// Assembles a model. The domestic rate factor must come first.
    pub(crate) fn new(
        asof: NaiveDate,
        day_count: DayCount,
        ir: Vec<HullWhiteFactor>,
        fx: Vec<FxFactor>,
        cholesky: CholeskyFactor,
        calibrated: bool,
    ) -> Result<Self, ModelError> {
        let domestic = ir
            .first()
            .map(|f| f.currency())
            .ok_or_else(|| ModelError::InvalidParameter("model has no rate factor".to_string()))?;
        if cholesky.dim() != ir.len() + fx.len() {
            return Err(ModelError::Correlation(format!(
                "correlation covers {} factors, model has {}",
                cholesky.dim(),
                ir.len() + fx.len()
            )));
        }
        Ok(Self {
            asof,
            day_count,
            domestic,
            ir,
            fx,
            cholesky,
            calibrated,
        })
    }

    /// As-of date of the model.
    #[inline]
    pub fn asof(&self) -> NaiveDate {
        self.asof
    }

    /// Day count converting dates to model time.
    #[inline]
    pub fn day_count(&self) -> DayCount {
        self.day_count
    }

    /// Model time of a date.
    #[inline]
    pub fn time(&self, date: NaiveDate) -> f64 {
        self.day_count.year_fraction(self.asof, date)
    }

    /// Domestic (base) currency.
    #[inline]
    pub fn domestic(&self) -> Currency {
        self.domestic
    }

    /// Rate factors; index 0 is domestic.
    #[inline]
    pub fn ir_factors(&self) -> &[HullWhiteFactor] {
        &self.ir
    }

    /// FX factors.
    #[inline]
    pub fn fx_factors(&self) -> &[FxFactor] {
        &self.fx
    }

    /// Total number of Brownian drivers.
    #[inline]
    pub fn num_factors(&self) -> usize {
        self.ir.len() + self.fx.len()
    }

    /// Cholesky factor of the driver correlation.
    #[inline]
    pub fn cholesky(&self) -> &CholeskyFactor {
        &self.cholesky
    }

    /// Whether calibration ran when the model was built.
    #[inline]
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Index of a currency's rate factor.
    pub fn ir_index(&self, ccy: Currency) -> Option<usize> {
        self.ir.iter().position(|f| f.currency() == ccy)
    }

    /// Index of a currency's FX factor.
    pub fn fx_index(&self, ccy: Currency) -> Option<usize> {
        self.fx.iter().position(|f| f.currency() == ccy)
    }

    /// Modelled currencies, domestic first.
    pub fn currencies(&self) -> Vec<Currency> {
        self.ir.iter().map(|f| f.currency()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn factor() -> HullWhiteFactor {
        HullWhiteFactor::new(Currency::USD, 0.05, 0.01, 0.03).unwrap()
    }

    #[test]
    fn test_zero_bond_at_origin_matches_curve() {
        let hw = factor();
        assert_relative_eq!(hw.zero_bond(0.0, 5.0, 0.0), (-0.15f64).exp(), epsilon = 1e-14);
        assert_eq!(hw.zero_bond(2.0, 1.0, 0.3), 1.0);
    }

    #[test]
    fn test_zero_bond_decreases_with_state() {
        let hw = factor();
        let low = hw.zero_bond(1.0, 3.0, -0.01);
        let high = hw.zero_bond(1.0, 3.0, 0.01);
        assert!(high < low);
    }

    #[test]
    fn test_transition_variance() {
        let hw = factor();
        let (decay, std) = hw.transition(1.0);
        assert_relative_eq!(decay, (-0.05f64).exp());
        assert_relative_eq!(
            std * std,
            0.01 * 0.01 * (1.0 - (-0.1f64).exp()) / 0.1,
            max_relative = 1e-12
        );
        assert_eq!(hw.transition(0.0).1, 0.0);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(HullWhiteFactor::new(Currency::USD, 0.0, 0.01, 0.03).is_err());
        assert!(HullWhiteFactor::new(Currency::USD, 0.05, -0.01, 0.03).is_err());
        assert!(FxFactor::new(Currency::EUR, 0.1, 0.0).is_err());
    }

    #[test]
    fn test_factor_order() {
        let data = CrossAssetModelData {
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
        assert_eq!(
            data.factors(),
            vec![
                FactorId::Ir(Currency::USD),
                FactorId::Ir(Currency::EUR),
                FactorId::Fx(Currency::EUR)
            ]
        );
    }
}
