//! Pricing engine configuration, reference data and pricing extensions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Product type to pricing engine mapping.
///
/// A trade builds only if its product type has an engine here.
///
/// # Examples
///
/// ```
/// use xva_engine::engine_data::EngineData;
///
/// let data = EngineData::default().with_engine("InterestRateSwap", "DiscountedCashflows");
/// assert_eq!(data.engine("InterestRateSwap"), Some("DiscountedCashflows"));
/// assert!(data.engine("FxForward").is_none());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineData {
    engines: BTreeMap<String, String>,
}

impl EngineData {
    /// Adds or replaces the engine of a product type.
    pub fn with_engine(mut self, product_type: impl Into<String>, engine: impl Into<String>) -> Self {
        self.engines.insert(product_type.into(), engine.into());
        self
    }

    /// Engine configured for a product type.
    ///
    /// Falls back to a case-insensitive match, since layered config sources
    /// may lowercase keys.
    pub fn engine(&self, product_type: &str) -> Option<&str> {
        self.engines
            .get(product_type)
            .or_else(|| {
                self.engines
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(product_type))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    /// Configured product types.
    pub fn product_types(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    /// True if no engine is configured.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// Opaque reference data, passed to trade builders untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceData(BTreeMap<String, String>);

impl ReferenceData {
    /// Adds or replaces an entry.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Looks up an entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Additional pricing component supplied by the caller.
///
/// Extensions hold state that must not leak between runs; the runner resets
/// every extension when it prepares a run.
pub trait PricingExtension: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Clears run state.
    fn reset(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_data_lookup() {
        let data = EngineData::default()
            .with_engine("FxForward", "Discounting")
            .with_engine("InterestRateSwap", "DiscountedCashflows");
        let products: Vec<&str> = data.product_types().collect();
        assert_eq!(products, vec!["FxForward", "InterestRateSwap"]);
        assert!(!data.is_empty());
    }

    #[test]
    fn test_engine_data_from_toml() {
        let data: EngineData = toml::from_str("InterestRateSwap = \"DiscountedCashflows\"").unwrap();
        assert_eq!(data.engine("InterestRateSwap"), Some("DiscountedCashflows"));

        let lowered: EngineData = toml::from_str("interestrateswap = \"DiscountedCashflows\"").unwrap();
        assert_eq!(lowered.engine("InterestRateSwap"), Some("DiscountedCashflows"));
    }

    #[test]
    fn test_reference_data() {
        let data = ReferenceData::default().with_entry("calendar", "TARGET");
        assert_eq!(data.get("calendar"), Some("TARGET"));
        assert_eq!(data.len(), 1);
        assert!(data.get("index").is_none());
    }
}
