//! Model and market error types.

use thiserror::Error;

use crate::types::Currency;

/// Errors raised while building models, grids and scenario generators.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ModelError {
    /// Model parameter outside its admissible range.
    #[error("Invalid model parameter: {0}")]
    InvalidParameter(String),

    /// Calibration of one model component failed.
    #[error("Calibration failed for {component}: {reason}")]
    Calibration {
        /// Component (e.g. `IR:USD`).
        component: String,
        /// Cause.
        reason: String,
    },

    /// Correlation matrix rejected.
    #[error("Invalid correlation: {0}")]
    Correlation(String),

    /// Currency required by the run but not modelled.
    #[error("Currency {0} is not part of the model")]
    MissingCurrency(Currency),

    /// Date grid rejected.
    #[error("Invalid date grid: {0}")]
    InvalidGrid(String),

    /// Extension point not provided by this build.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Today's market lacks required data.
    #[error(transparent)]
    Market(#[from] MarketError),
}

/// Errors raised by market lookups.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum MarketError {
    /// No discount curve for the currency.
    #[error("No discount curve for {0}")]
    MissingCurve(Currency),

    /// No FX spot for the currency.
    #[error("No FX spot for {0}")]
    MissingFxSpot(Currency),

    /// Currency is not simulated by the scenario market.
    #[error("Currency {0} is not simulated")]
    NotSimulated(Currency),

    /// No credit curve under the name.
    #[error("No credit curve named {0}")]
    MissingCreditCurve(String),

    /// No funding spread curve under the name.
    #[error("No spread curve named {0}")]
    MissingSpreadCurve(String),

    /// Market data outside its admissible range.
    #[error("Invalid market data: {0}")]
    InvalidData(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_display() {
        let err = ModelError::Calibration {
            component: "IR:EUR".to_string(),
            reason: "non-positive target volatility".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Calibration failed for IR:EUR: non-positive target volatility"
        );
    }

    #[test]
    fn test_market_error_is_transparent() {
        let err: ModelError = MarketError::MissingCurve(Currency::GBP).into();
        assert_eq!(format!("{}", err), "No discount curve for GBP");
    }
}
