//! Portfolio of trades and netting set definitions.
//!
//! Trades are held behind `Arc` so a filtered portfolio shares trades (and
//! their cached pricing state) with the portfolio it was taken from.
//!
//! # Examples
//!
//! ```
//! use chrono::NaiveDate;
//! use xva_engine::instruments::{FxForward, InterestRateSwap};
//! use xva_engine::portfolio::{Portfolio, Trade, TradeId};
//! use xva_models::Currency;
//!
//! let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
//! let mut portfolio = Portfolio::new();
//! portfolio
//!     .add(Trade::new(
//!         "SWAP_1",
//!         InterestRateSwap::new(Currency::USD, 1e6, 0.03, d(2024, 1, 2), d(2029, 1, 2)),
//!         "CPTY_A",
//!         "NS_B",
//!     ))
//!     .unwrap();
//! portfolio
//!     .add(Trade::new(
//!         "FXF_1",
//!         FxForward::new(Currency::EUR, 1e6, Currency::USD, 1.1e6, d(2025, 1, 2)),
//!         "CPTY_A",
//!         "NS_A",
//!     ))
//!     .unwrap();
//!
//! let netting_set_ids = portfolio.netting_set_ids();
//! let ids: Vec<&str> = netting_set_ids.iter().map(|n| n.as_str()).collect();
//! assert_eq!(ids, vec!["NS_A", "NS_B"]);
//!
//! let subset = portfolio.filtered(&[TradeId::new("FXF_1")]).unwrap();
//! assert_eq!(subset.len(), 1);
//! ```

mod ids;
mod netting_set;
mod trade;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

pub use ids::{CounterpartyId, NettingSetId, TradeId};
pub use netting_set::{NettingSetDefinition, NettingSetDefinitions};
pub use trade::{Envelope, Trade};

use crate::error::PortfolioError;

/// Ordered collection of trades with unique ids.
#[derive(Clone, Debug, Default)]
pub struct Portfolio {
    trades: Vec<Arc<Trade>>,
    index: HashMap<TradeId, usize>,
}

impl Portfolio {
    /// Creates an empty portfolio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a trade.
    ///
    /// # Errors
    ///
    /// `PortfolioError::DuplicateTrade` if the id is already present.
    pub fn add(&mut self, trade: Trade) -> Result<(), PortfolioError> {
        self.add_shared(Arc::new(trade))
    }

    fn add_shared(&mut self, trade: Arc<Trade>) -> Result<(), PortfolioError> {
        if self.index.contains_key(trade.id()) {
            return Err(PortfolioError::DuplicateTrade(trade.id().to_string()));
        }
        self.index.insert(trade.id().clone(), self.trades.len());
        self.trades.push(trade);
        Ok(())
    }

    /// Number of trades.
    #[inline]
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    /// True if the portfolio holds no trades.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Trades in insertion order.
    #[inline]
    pub fn trades(&self) -> &[Arc<Trade>] {
        &self.trades
    }

    /// Looks up a trade.
    pub fn trade(&self, id: &TradeId) -> Option<&Arc<Trade>> {
        self.index.get(id).map(|&i| &self.trades[i])
    }

    /// True if the trade is present.
    pub fn contains(&self, id: &TradeId) -> bool {
        self.index.contains_key(id)
    }

    /// Trade ids in insertion order.
    pub fn ids(&self) -> Vec<TradeId> {
        self.trades.iter().map(|t| t.id().clone()).collect()
    }

    /// Sub-portfolio of the given ids, in this portfolio's order.
    ///
    /// # Errors
    ///
    /// `PortfolioError::TradeNotFound` for the first unknown id.
    pub fn filtered(&self, ids: &[TradeId]) -> Result<Portfolio, PortfolioError> {
        if let Some(missing) = ids.iter().find(|id| !self.contains(id)) {
            return Err(PortfolioError::TradeNotFound(missing.to_string()));
        }
        let wanted: HashSet<&TradeId> = ids.iter().collect();
        let mut subset = Portfolio::new();
        for trade in self.trades.iter().filter(|t| wanted.contains(t.id())) {
            subset.add_shared(Arc::clone(trade))?;
        }
        Ok(subset)
    }

    /// Distinct netting set ids of the trades, sorted.
    pub fn netting_set_ids(&self) -> Vec<NettingSetId> {
        self.trades
            .iter()
            .map(|t| t.netting_set_id().clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Drops the cached pricing state of every trade.
    pub fn reset_cached_pricing_state(&self) {
        for trade in &self.trades {
            trade.reset_cached_pricing_state();
        }
    }
}
