//! Portfolio files and the built-in demo portfolio.
//!
//! A portfolio file is a JSON array of trades tagged by product type:
//!
//! ```json
//! [
//!   {"type": "InterestRateSwap", "id": "SWAP_1", "counterparty": "CP_A",
//!    "netting_set": "NS_A", "currency": "USD", "notional": 1e7,
//!    "fixed_rate": 0.03, "start": "2024-01-02", "maturity": "2029-01-02"},
//!   {"type": "FxForward", "id": "FXF_1", "counterparty": "CP_A",
//!    "netting_set": "NS_A", "bought_currency": "EUR", "bought_amount": 1e6,
//!    "sold_currency": "USD", "sold_amount": 1.1e6, "maturity": "2025-01-02"}
//! ]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Months, NaiveDate};
use serde::Deserialize;
use xva_engine::instruments::{FxForward, InterestRateSwap};
use xva_engine::portfolio::{Portfolio, Trade};
use xva_models::Currency;

fn default_pay_fixed() -> bool {
    true
}

/// One trade of a portfolio file.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum TradeSpec {
    /// Fixed versus floating swap.
    InterestRateSwap {
        /// Trade id.
        id: String,
        /// Counterparty id.
        counterparty: String,
        /// Netting set id.
        netting_set: String,
        /// Currency.
        currency: Currency,
        /// Notional.
        notional: f64,
        /// Fixed rate.
        fixed_rate: f64,
        /// Start date.
        start: NaiveDate,
        /// Maturity date.
        maturity: NaiveDate,
        /// Pay the fixed leg.
        #[serde(default = "default_pay_fixed")]
        pay_fixed: bool,
    },
    /// Physically settled FX forward.
    FxForward {
        /// Trade id.
        id: String,
        /// Counterparty id.
        counterparty: String,
        /// Netting set id.
        netting_set: String,
        /// Currency received.
        bought_currency: Currency,
        /// Amount received.
        bought_amount: f64,
        /// Currency paid.
        sold_currency: Currency,
        /// Amount paid.
        sold_amount: f64,
        /// Settlement date.
        maturity: NaiveDate,
    },
}

impl TradeSpec {
    fn into_trade(self) -> Trade {
        match self {
            TradeSpec::InterestRateSwap {
                id,
                counterparty,
                netting_set,
                currency,
                notional,
                fixed_rate,
                start,
                maturity,
                pay_fixed,
            } => Trade::new(
                id,
                InterestRateSwap::new(currency, notional, fixed_rate, start, maturity)
                    .with_pay_fixed(pay_fixed),
                counterparty,
                netting_set,
            ),
            TradeSpec::FxForward {
                id,
                counterparty,
                netting_set,
                bought_currency,
                bought_amount,
                sold_currency,
                sold_amount,
                maturity,
            } => Trade::new(
                id,
                FxForward::new(bought_currency, bought_amount, sold_currency, sold_amount, maturity),
                counterparty,
                netting_set,
            ),
        }
    }
}

/// Parses a JSON portfolio.
pub fn from_json(content: &str) -> Result<Portfolio> {
    let specs: Vec<TradeSpec> = serde_json::from_str(content).context("parsing portfolio")?;
    let mut portfolio = Portfolio::new();
    for spec in specs {
        portfolio.add(spec.into_trade())?;
    }
    Ok(portfolio)
}

/// Loads a JSON portfolio file.
pub fn load(path: &Path) -> Result<Portfolio> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading portfolio {}", path.display()))?;
    from_json(&content)
}

/// Two netting sets: a receiver and a payer swap in the base currency with
/// counterparty `CP_A`, and an FX forward against `foreign` with `CP_B` if a
/// foreign currency is modelled.
pub fn demo(asof: NaiveDate, base: Currency, foreign: Option<Currency>) -> Result<Portfolio> {
    let years = |n: u32| {
        asof.checked_add_months(Months::new(12 * n))
            .with_context(|| format!("{} + {}Y out of range", asof, n))
    };

    let mut portfolio = Portfolio::new();
    portfolio.add(Trade::new(
        "SWAP_PAY_5Y",
        InterestRateSwap::new(base, 10_000_000.0, 0.03, asof, years(5)?),
        "CP_A",
        "NS_CP_A",
    ))?;
    portfolio.add(Trade::new(
        "SWAP_REC_3Y",
        InterestRateSwap::new(base, 5_000_000.0, 0.028, asof, years(3)?).with_pay_fixed(false),
        "CP_A",
        "NS_CP_A",
    ))?;
    if let Some(foreign) = foreign {
        portfolio.add(Trade::new(
            "FXF_1Y",
            FxForward::new(foreign, 1_000_000.0, base, 1_100_000.0, years(1)?),
            "CP_B",
            "NS_CP_B",
        ))?;
    }
    Ok(portfolio)
}
