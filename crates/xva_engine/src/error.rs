//! Engine error types.
//!
//! [`XvaError`] is the error of every runner entry point. Lower layers
//! convert into it with `?`.

use thiserror::Error;
use xva_cube::CubeError;
use xva_models::{MarketError, ModelError};

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, XvaError>;

/// Errors raised by the valuation engine and the run orchestrator.
#[derive(Debug, Error)]
pub enum XvaError {
    /// Invalid run configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cube or scenario data dimensions do not match the run.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Requested trade id is not in the portfolio.
    #[error("Unknown trade: {0}")]
    UnknownTrade(String),

    /// Extension point not provided by this build.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Model construction or calibration failed.
    #[error("Model calibration error: {0}")]
    ModelCalibration(#[source] ModelError),

    /// A trade could not be built.
    #[error("Trade build failed for {trade_id}: {cause}")]
    TradeBuild {
        /// Trade id.
        trade_id: String,
        /// Cause.
        cause: String,
    },

    /// A trade could not be priced on a path.
    #[error("Pricing failed for {trade_id} on sample {sample}: {cause}")]
    Pricing {
        /// Trade id.
        trade_id: String,
        /// Sample index.
        sample: usize,
        /// Cause.
        cause: String,
    },

    /// Cube access outside the allocated range.
    #[error("Cube index error: {0}")]
    Index(#[from] CubeError),

    /// Entry point called before the stage it depends on.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Portfolio lookup or construction failed.
    #[error(transparent)]
    Portfolio(#[from] PortfolioError),
}

impl XvaError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    /// Creates a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }
}

impl From<ModelError> for XvaError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::UnsupportedOperation(msg) => Self::UnsupportedOperation(msg),
            ModelError::InvalidGrid(msg) => Self::Configuration(msg),
            other => Self::ModelCalibration(other),
        }
    }
}

impl From<MarketError> for XvaError {
    fn from(err: MarketError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Errors raised by portfolio operations.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PortfolioError {
    /// Trade not found in the portfolio.
    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    /// Duplicate trade id.
    #[error("Duplicate trade ID: {0}")]
    DuplicateTrade(String),

    /// Duplicate netting set definition.
    #[error("Duplicate netting set ID: {0}")]
    DuplicateNettingSet(String),

    /// Trade has not been built.
    #[error("Trade {0} has not been built")]
    NotBuilt(String),
}

/// Errors raised by instruments while building or pricing.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum InstrumentError {
    /// No pricing engine configured for the product type.
    #[error("No pricing engine configured for product type {0}")]
    UnsupportedProduct(String),

    /// Trade terms are inconsistent.
    #[error("Invalid trade: {0}")]
    InvalidTrade(String),

    /// Market lookup failed.
    #[error(transparent)]
    Market(#[from] MarketError),

    /// Result is not a finite number.
    #[error("Non-finite value: {0}")]
    NonFinite(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use xva_models::Currency;

    #[test]
    fn test_error_display() {
        let err = XvaError::UnknownTrade("T9".to_string());
        assert_eq!(format!("{}", err), "Unknown trade: T9");

        let err = XvaError::TradeBuild {
            trade_id: "T1".to_string(),
            cause: "bad".to_string(),
        };
        assert_eq!(format!("{}", err), "Trade build failed for T1: bad");
    }

    #[test]
    fn test_model_error_mapping() {
        let err: XvaError = ModelError::UnsupportedOperation("x".to_string()).into();
        assert!(matches!(err, XvaError::UnsupportedOperation(_)));

        let err: XvaError = ModelError::MissingCurrency(Currency::GBP).into();
        assert!(matches!(err, XvaError::ModelCalibration(_)));
    }

    #[test]
    fn test_cube_error_conversion() {
        let err: XvaError = CubeError::UnknownId("N1".to_string()).into();
        assert!(matches!(err, XvaError::Index(_)));
    }

    #[test]
    fn test_instrument_error_from_market() {
        let err: InstrumentError = MarketError::NotSimulated(Currency::EUR).into();
        assert_eq!(err.to_string(), "Currency EUR is not simulated");
    }
}
