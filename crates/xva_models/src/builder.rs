//! Builds a [`CrossAssetModel`] from model data and today's market.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::correlation::{CorrelationMatrix, FactorId};
use crate::error::ModelError;
use crate::market::TodaysMarket;
use crate::model::{CrossAssetModel, CrossAssetModelData, FxFactor, HullWhiteFactor, IrModelData};

/// Calibration failure suppressed under `continue_on_err`.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationFailure {
    /// Model component, e.g. `IR:USD`.
    pub component: String,
    /// Cause.
    pub reason: String,
}

/// Outcome of a model build.
#[derive(Clone, Debug)]
pub struct ModelBuild {
    /// The model.
    pub model: Arc<CrossAssetModel>,
    /// Calibration failures that were recorded instead of raised.
    pub failures: Vec<CalibrationFailure>,
}

/// Hull-White sigma whose state variance at `expiry` equals that of a normal
/// model with volatility `normal_vol`.
///
/// Solves `σ² (1 - e^{-2aT}) / (2a) = vol² T` for `σ`.
pub fn hull_white_sigma_for_normal_vol(
    mean_reversion: f64,
    normal_vol: f64,
    expiry: f64,
) -> Result<f64, String> {
    if !(normal_vol > 0.0) {
        return Err(format!("target volatility must be positive, got {}", normal_vol));
    }
    if !(expiry > 0.0) {
        return Err(format!("target expiry must be positive, got {}", expiry));
    }
    if !(mean_reversion > 0.0) {
        return Err(format!("mean reversion must be positive, got {}", mean_reversion));
    }
    let two_at = 2.0 * mean_reversion * expiry;
    Ok(normal_vol * (two_at / (1.0 - (-two_at).exp())).sqrt())
}

/// Model builder.
///
/// The as-of date and day count are taken from the market passed in, so the
/// model never reads a process-wide evaluation date.
pub struct CrossAssetModelBuilder<'a> {
    market: &'a TodaysMarket,
    data: &'a CrossAssetModelData,
    continue_on_err: bool,
}

impl<'a> CrossAssetModelBuilder<'a> {
    /// Creates a builder.
    pub fn new(market: &'a TodaysMarket, data: &'a CrossAssetModelData) -> Self {
        Self {
            market,
            data,
            continue_on_err: false,
        }
    }

    /// Records calibration failures instead of failing the build.
    pub fn continue_on_error(mut self, continue_on_err: bool) -> Self {
        self.continue_on_err = continue_on_err;
        self
    }

    /// Builds the model, calibrating rate factors with a target when
    /// `calibrate` is set.
    ///
    /// # Errors
    ///
    /// - `MissingCurrency` if the market's base currency has no rate factor
    /// - `InvalidParameter` for bad factor parameters or FX factor setup
    /// - `Market` if a curve or FX spot is missing
    /// - `Correlation` for an invalid correlation matrix
    /// - `Calibration` unless `continue_on_error(true)`
    pub fn build(&self, calibrate: bool) -> Result<ModelBuild, ModelError> {
        let domestic = self.market.base_currency();
        let domestic_pos = self
            .data
            .ir
            .iter()
            .position(|ir| ir.currency == domestic)
            .ok_or(ModelError::MissingCurrency(domestic))?;

        let mut ordered: Vec<&IrModelData> = Vec::with_capacity(self.data.ir.len());
        ordered.push(&self.data.ir[domestic_pos]);
        ordered.extend(
            self.data
                .ir
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != domestic_pos)
                .map(|(_, ir)| ir),
        );

        let mut failures = Vec::new();
        let mut ir = Vec::with_capacity(ordered.len());
        for data in &ordered {
            if ir.iter().any(|f: &HullWhiteFactor| f.currency() == data.currency) {
                return Err(ModelError::InvalidParameter(format!(
                    "duplicate rate factor IR:{}",
                    data.currency
                )));
            }
            let sigma = match (calibrate, data.calibration) {
                (true, Some(target)) => {
                    match hull_white_sigma_for_normal_vol(
                        data.mean_reversion,
                        target.normal_vol,
                        target.expiry,
                    ) {
                        Ok(sigma) => {
                            debug!(currency = %data.currency, sigma, "calibrated rate factor");
                            sigma
                        }
                        Err(reason) => {
                            let component = FactorId::Ir(data.currency).to_string();
                            if !self.continue_on_err {
                                return Err(ModelError::Calibration { component, reason });
                            }
                            warn!(%component, %reason, "calibration failed, keeping configured sigma");
                            failures.push(CalibrationFailure { component, reason });
                            data.sigma
                        }
                    }
                }
                _ => data.sigma,
            };
            let zero_rate = self.market.zero_rate(data.currency)?;
            ir.push(HullWhiteFactor::new(
                data.currency,
                data.mean_reversion,
                sigma,
                zero_rate,
            )?);
        }

        let mut fx = Vec::with_capacity(self.data.fx.len());
        for data in &self.data.fx {
            if data.currency == domestic {
                return Err(ModelError::InvalidParameter(format!(
                    "FX factor for domestic currency {}",
                    domestic
                )));
            }
            if !ir.iter().any(|f| f.currency() == data.currency) {
                return Err(ModelError::MissingCurrency(data.currency));
            }
            if fx.iter().any(|f: &FxFactor| f.currency() == data.currency) {
                return Err(ModelError::InvalidParameter(format!(
                    "duplicate FX factor FX:{}",
                    data.currency
                )));
            }
            let spot = self.market.fx_spot(data.currency)?;
            fx.push(FxFactor::new(data.currency, data.sigma, spot)?);
        }
        if let Some(foreign) = ir
            .iter()
            .skip(1)
            .find(|f| !fx.iter().any(|x| x.currency() == f.currency()))
        {
            return Err(ModelError::InvalidParameter(format!(
                "foreign rate factor IR:{} has no FX factor",
                foreign.currency()
            )));
        }

        let factors: Vec<FactorId> = ir
            .iter()
            .map(|f| FactorId::Ir(f.currency()))
            .chain(fx.iter().map(|f| FactorId::Fx(f.currency())))
            .collect();
        let pairs = self
            .data
            .correlations
            .iter()
            .map(|c| Ok((c.factor1.parse::<FactorId>()?, c.factor2.parse::<FactorId>()?, c.value)))
            .collect::<Result<Vec<_>, ModelError>>()?;
        let cholesky = CorrelationMatrix::from_pairs(&factors, &pairs)?.cholesky()?;

        let model = CrossAssetModel::new(
            self.market.asof(),
            self.market.day_count(),
            ir,
            fx,
            cholesky,
            calibrate,
        )?;
        debug!(
            factors = model.num_factors(),
            calibrated = calibrate,
            "built cross-asset model"
        );

        Ok(ModelBuild {
            model: Arc::new(model),
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CorrelationEntry, FxModelData, IrCalibrationTarget};
    use crate::types::{Currency, DayCount};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn market() -> TodaysMarket {
        TodaysMarket::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            Currency::USD,
            DayCount::Act365F,
        )
        .with_zero_rate(Currency::USD, 0.04)
        .with_zero_rate(Currency::EUR, 0.03)
        .with_fx_spot(Currency::EUR, 1.1)
    }

    fn data(target_vol: f64) -> CrossAssetModelData {
        CrossAssetModelData {
            ir: vec![
                IrModelData {
                    currency: Currency::EUR,
                    mean_reversion: 0.02,
                    sigma: 0.008,
                    calibration: None,
                },
                IrModelData {
                    currency: Currency::USD,
                    mean_reversion: 0.03,
                    sigma: 0.01,
                    calibration: Some(IrCalibrationTarget {
                        normal_vol: target_vol,
                        expiry: 5.0,
                    }),
                },
            ],
            fx: vec![FxModelData {
                currency: Currency::EUR,
                sigma: 0.1,
            }],
            correlations: vec![CorrelationEntry {
                factor1: "IR:USD".to_string(),
                factor2: "FX:EUR".to_string(),
                value: 0.3,
            }],
        }
    }

    #[test]
    fn test_sigma_matches_variance() {
        let a = 0.03;
        let sigma = hull_white_sigma_for_normal_vol(a, 0.01, 5.0).unwrap();
        let var = sigma * sigma * (1.0 - (-2.0 * a * 5.0f64).exp()) / (2.0 * a);
        assert_relative_eq!(var, 0.01 * 0.01 * 5.0, max_relative = 1e-12);
        assert!(hull_white_sigma_for_normal_vol(a, 0.0, 5.0).is_err());
    }

    #[test]
    fn test_domestic_first_and_calibrated() {
        let market = market();
        let data = data(0.01);
        let build = CrossAssetModelBuilder::new(&market, &data).build(true).unwrap();
        let model = build.model;
        assert_eq!(model.domestic(), Currency::USD);
        assert_eq!(model.ir_index(Currency::EUR), Some(1));
        assert!(model.is_calibrated());
        assert_relative_eq!(
            model.ir_factors()[0].sigma(),
            hull_white_sigma_for_normal_vol(0.03, 0.01, 5.0).unwrap()
        );
        assert!(build.failures.is_empty());
    }

    #[test]
    fn test_deferred_calibration_keeps_sigma() {
        let market = market();
        let data = data(0.01);
        let model = CrossAssetModelBuilder::new(&market, &data).build(false).unwrap().model;
        assert!(!model.is_calibrated());
        assert_relative_eq!(model.ir_factors()[0].sigma(), 0.01);
    }

    #[test]
    fn test_calibration_failure_modes() {
        let market = market();
        let data = data(-0.01);
        let err = CrossAssetModelBuilder::new(&market, &data).build(true).unwrap_err();
        assert!(matches!(err, ModelError::Calibration { .. }));

        let build = CrossAssetModelBuilder::new(&market, &data)
            .continue_on_error(true)
            .build(true)
            .unwrap();
        assert_eq!(build.failures.len(), 1);
        assert_eq!(build.failures[0].component, "IR:USD");
        assert_relative_eq!(build.model.ir_factors()[0].sigma(), 0.01);
    }

    #[test]
    fn test_missing_domestic_factor() {
        let market = market();
        let mut data = data(0.01);
        data.ir.retain(|ir| ir.currency != Currency::USD);
        let err = CrossAssetModelBuilder::new(&market, &data).build(false).unwrap_err();
        assert_eq!(err, ModelError::MissingCurrency(Currency::USD));
    }

    #[test]
    fn test_missing_fx_spot() {
        let market = TodaysMarket::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            Currency::USD,
            DayCount::Act365F,
        )
        .with_zero_rate(Currency::USD, 0.04)
        .with_zero_rate(Currency::EUR, 0.03);
        let data = data(0.01);
        let err = CrossAssetModelBuilder::new(&market, &data).build(false).unwrap_err();
        assert!(matches!(err, ModelError::Market(_)));
    }
}
