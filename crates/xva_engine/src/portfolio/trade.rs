//! Trade: instrument terms, envelope and cached pricing state.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::ids::{CounterpartyId, NettingSetId, TradeId};
use crate::instruments::{BuildContext, Instrument, PricedInstrument};
use crate::error::InstrumentError;

/// Where a trade sits for aggregation: its netting set and counterparty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Netting set the trade is aggregated into.
    pub netting_set_id: NettingSetId,
    /// Counterparty facing the trade.
    pub counterparty_id: CounterpartyId,
}

/// Trade with its instrument.
///
/// The built pricing representation is cached on the trade and shared by
/// every portfolio holding it; [`Trade::reset_cached_pricing_state`] clears
/// it.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use xva_engine::instruments::InterestRateSwap;
/// use xva_engine::portfolio::Trade;
/// use xva_models::Currency;
///
/// let swap = InterestRateSwap::new(
///     Currency::USD,
///     1_000_000.0,
///     0.035,
///     NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
///     NaiveDate::from_ymd_opt(2027, 1, 2).unwrap(),
/// );
/// let trade = Trade::new("SWAP_1", swap, "CPTY_A", "NS_A");
///
/// assert_eq!(trade.netting_set_id().as_str(), "NS_A");
/// assert!(!trade.is_built());
/// ```
#[derive(Debug)]
pub struct Trade {
    id: TradeId,
    envelope: Envelope,
    instrument: Arc<dyn Instrument>,
    built: RwLock<Option<Arc<dyn PricedInstrument>>>,
}

impl Trade {
    /// Creates an unbuilt trade.
    pub fn new(
        id: impl Into<TradeId>,
        instrument: impl Instrument + 'static,
        counterparty_id: impl Into<CounterpartyId>,
        netting_set_id: impl Into<NettingSetId>,
    ) -> Self {
        Self::from_shared(
            id.into(),
            Arc::new(instrument),
            Envelope {
                netting_set_id: netting_set_id.into(),
                counterparty_id: counterparty_id.into(),
            },
        )
    }

    /// Creates an unbuilt trade around a shared instrument.
    pub fn from_shared(id: TradeId, instrument: Arc<dyn Instrument>, envelope: Envelope) -> Self {
        Self {
            id,
            envelope,
            instrument,
            built: RwLock::new(None),
        }
    }

    /// Trade id.
    #[inline]
    pub fn id(&self) -> &TradeId {
        &self.id
    }

    /// Envelope.
    #[inline]
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Netting set id.
    #[inline]
    pub fn netting_set_id(&self) -> &NettingSetId {
        &self.envelope.netting_set_id
    }

    /// Counterparty id.
    #[inline]
    pub fn counterparty_id(&self) -> &CounterpartyId {
        &self.envelope.counterparty_id
    }

    /// Instrument terms.
    #[inline]
    pub fn instrument(&self) -> &Arc<dyn Instrument> {
        &self.instrument
    }

    /// Product type of the instrument.
    #[inline]
    pub fn product_type(&self) -> &'static str {
        self.instrument.product_type()
    }

    /// Builds the instrument and caches the result.
    ///
    /// A failed build leaves the trade unbuilt.
    pub fn build(&self, ctx: &BuildContext<'_>) -> Result<Arc<dyn PricedInstrument>, InstrumentError> {
        let priced = self.instrument.build(ctx)?;
        *self.write_cache() = Some(Arc::clone(&priced));
        Ok(priced)
    }

    /// Cached pricing representation, if built.
    pub fn priced(&self) -> Option<Arc<dyn PricedInstrument>> {
        self.read_cache().clone()
    }

    /// True if a pricing representation is cached.
    pub fn is_built(&self) -> bool {
        self.read_cache().is_some()
    }

    /// Drops the cached pricing representation.
    pub fn reset_cached_pricing_state(&self) {
        *self.write_cache() = None;
    }

    // A panic while holding the lock cannot leave the Option half-written.
    fn read_cache(&self) -> RwLockReadGuard<'_, Option<Arc<dyn PricedInstrument>>> {
        self.built.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, Option<Arc<dyn PricedInstrument>>> {
        self.built.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_data::{EngineData, ReferenceData};
    use crate::instruments::test_support::{d, flat_market};
    use crate::instruments::FxForward;
    use xva_models::Currency;

    #[test]
    fn test_build_and_reset() {
        let market = flat_market(0.03, 0.01, 1.1);
        let engines = EngineData::default().with_engine("FxForward", "Discounting");
        let refdata = ReferenceData::default();
        let ctx = BuildContext {
            engine_data: &engines,
            reference_data: &refdata,
            market: &market,
        };
        let trade = Trade::new(
            "FXF_1",
            FxForward::new(Currency::EUR, 1.0, Currency::USD, 1.1, d(2025, 1, 2)),
            "CPTY_A",
            "NS_A",
        );
        assert_eq!(trade.product_type(), "FxForward");
        assert!(trade.priced().is_none());

        trade.build(&ctx).unwrap();
        assert!(trade.is_built());

        trade.reset_cached_pricing_state();
        assert!(!trade.is_built());
    }

    #[test]
    fn test_failed_build_leaves_trade_unbuilt() {
        let market = flat_market(0.03, 0.01, 1.1);
        let engines = EngineData::default();
        let refdata = ReferenceData::default();
        let ctx = BuildContext {
            engine_data: &engines,
            reference_data: &refdata,
            market: &market,
        };
        let trade = Trade::new(
            "FXF_1",
            FxForward::new(Currency::EUR, 1.0, Currency::USD, 1.1, d(2025, 1, 2)),
            "CPTY_A",
            "NS_A",
        );
        assert!(trade.build(&ctx).is_err());
        assert!(!trade.is_built());
    }
}
