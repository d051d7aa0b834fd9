//! Per (date, sample) auxiliary data recorded during simulation.
//!
//! Aggregation scenario data holds the values that post-processing needs but
//! that do not depend on any trade: the numeraire, FX spots and short rates.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::{CubeAxis, CubeError};

/// Kind of an aggregation scenario value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScenarioDataType {
    /// Numeraire value in base currency.
    Numeraire,
    /// FX spot of a foreign currency against base.
    FxSpot,
    /// Short rate of a currency.
    ShortRate,
}

impl fmt::Display for ScenarioDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioDataType::Numeraire => write!(f, "Numeraire"),
            ScenarioDataType::FxSpot => write!(f, "FXSpot"),
            ScenarioDataType::ShortRate => write!(f, "ShortRate"),
        }
    }
}

/// Key of an aggregation scenario value: a type plus a qualifier such as a
/// currency code. The numeraire uses an empty qualifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScenarioDataKey {
    kind: ScenarioDataType,
    qualifier: String,
}

impl ScenarioDataKey {
    /// Creates a key.
    pub fn new(kind: ScenarioDataType, qualifier: impl Into<String>) -> Self {
        Self {
            kind,
            qualifier: qualifier.into(),
        }
    }

    /// Numeraire key.
    pub fn numeraire() -> Self {
        Self::new(ScenarioDataType::Numeraire, "")
    }

    /// FX spot key for a currency code.
    pub fn fx_spot(ccy: impl Into<String>) -> Self {
        Self::new(ScenarioDataType::FxSpot, ccy)
    }

    /// Short rate key for a currency code.
    pub fn short_rate(ccy: impl Into<String>) -> Self {
        Self::new(ScenarioDataType::ShortRate, ccy)
    }

    /// Value type.
    #[inline]
    pub fn kind(&self) -> ScenarioDataType {
        self.kind
    }

    /// Qualifier.
    #[inline]
    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }
}

impl fmt::Display for ScenarioDataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.qualifier.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}/{}", self.kind, self.qualifier)
        }
    }
}

impl FromStr for ScenarioDataKey {
    type Err = CubeError;

    /// Parses `Numeraire`, `FXSpot/EUR` or `ShortRate/USD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, qualifier) = match s.trim().split_once('/') {
            Some((k, q)) => (k.trim(), q.trim()),
            None => (s.trim(), ""),
        };
        let kind = match kind {
            "Numeraire" if qualifier.is_empty() => ScenarioDataType::Numeraire,
            "FXSpot" if !qualifier.is_empty() => ScenarioDataType::FxSpot,
            "ShortRate" if !qualifier.is_empty() => ScenarioDataType::ShortRate,
            _ => return Err(CubeError::UnknownScenarioKey(s.to_string())),
        };
        Ok(Self::new(kind, qualifier))
    }
}

/// Dense `(date, sample, key)` store of `f64` values.
///
/// Sized to the valuation dates and sample count of the run. Like the cube,
/// storage is sample-major so workers can fill disjoint blocks.
#[derive(Clone, Debug)]
pub struct AggregationScenarioData {
    dates: Vec<NaiveDate>,
    samples: usize,
    keys: Vec<ScenarioDataKey>,
    key_lookup: HashMap<ScenarioDataKey, usize>,
    data: Vec<f64>,
}

impl AggregationScenarioData {
    /// Allocates storage for the given keys, with every value set to zero.
    ///
    /// Duplicate keys are collapsed.
    pub fn new(dates: Vec<NaiveDate>, samples: usize, keys: Vec<ScenarioDataKey>) -> Self {
        let mut unique = Vec::with_capacity(keys.len());
        let mut key_lookup = HashMap::with_capacity(keys.len());
        for key in keys {
            if !key_lookup.contains_key(&key) {
                key_lookup.insert(key.clone(), unique.len());
                unique.push(key);
            }
        }
        let len = dates.len() * samples * unique.len();
        Self {
            dates,
            samples,
            keys: unique,
            key_lookup,
            data: vec![0.0; len],
        }
    }

    /// Valuation dates.
    #[inline]
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Number of valuation dates.
    #[inline]
    pub fn num_dates(&self) -> usize {
        self.dates.len()
    }

    /// Number of samples.
    #[inline]
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Allocated keys in insertion order.
    #[inline]
    pub fn keys(&self) -> &[ScenarioDataKey] {
        &self.keys
    }

    /// Returns true if the key was allocated.
    pub fn has(&self, key: &ScenarioDataKey) -> bool {
        self.key_lookup.contains_key(key)
    }

    fn key_index(&self, key: &ScenarioDataKey) -> Result<usize, CubeError> {
        self.key_lookup
            .get(key)
            .copied()
            .ok_or_else(|| CubeError::UnknownScenarioKey(key.to_string()))
    }

    fn offset(&self, date: usize, sample: usize, key: usize) -> Result<usize, CubeError> {
        if date >= self.dates.len() {
            return Err(CubeError::IndexOutOfRange {
                axis: CubeAxis::Date,
                index: date,
                size: self.dates.len(),
            });
        }
        if sample >= self.samples {
            return Err(CubeError::IndexOutOfRange {
                axis: CubeAxis::Sample,
                index: sample,
                size: self.samples,
            });
        }
        Ok((sample * self.dates.len() + date) * self.keys.len() + key)
    }

    /// Reads a value.
    pub fn get(&self, date: usize, sample: usize, key: &ScenarioDataKey) -> Result<f64, CubeError> {
        let k = self.key_index(key)?;
        let offset = self.offset(date, sample, k)?;
        Ok(self.data[offset])
    }

    /// Overwrites a value.
    pub fn set(
        &mut self,
        date: usize,
        sample: usize,
        key: &ScenarioDataKey,
        value: f64,
    ) -> Result<(), CubeError> {
        let k = self.key_index(key)?;
        let offset = self.offset(date, sample, k)?;
        self.data[offset] = value;
        Ok(())
    }

    /// Values of one key on one date across all samples.
    pub fn values_at(&self, date: usize, key: &ScenarioDataKey) -> Result<Vec<f64>, CubeError> {
        (0..self.samples)
            .map(|sample| self.get(date, sample, key))
            .collect()
    }

    /// Disjoint mutable views of each sample's block, in sample order.
    pub fn sample_blocks_mut(&mut self) -> Vec<ScenarioBlockMut<'_>> {
        let block = self.dates.len() * self.keys.len();
        let n_dates = self.dates.len();
        let lookup = &self.key_lookup;
        if block == 0 {
            return (0..self.samples)
                .map(|_| ScenarioBlockMut {
                    data: &mut [],
                    n_dates,
                    lookup,
                })
                .collect();
        }
        self.data
            .chunks_mut(block)
            .map(|data| ScenarioBlockMut {
                data,
                n_dates,
                lookup,
            })
            .collect()
    }
}

/// Mutable view of one sample's scenario data.
#[derive(Debug)]
pub struct ScenarioBlockMut<'a> {
    data: &'a mut [f64],
    n_dates: usize,
    lookup: &'a HashMap<ScenarioDataKey, usize>,
}

impl ScenarioBlockMut<'_> {
    /// Overwrites a value for this sample.
    ///
    /// Keys that were not allocated are skipped and reported as `false`, so a
    /// market exposing more factors than the run records is not an error.
    pub fn set(&mut self, date: usize, key: &ScenarioDataKey, value: f64) -> Result<bool, CubeError> {
        if date >= self.n_dates {
            return Err(CubeError::IndexOutOfRange {
                axis: CubeAxis::Date,
                index: date,
                size: self.n_dates,
            });
        }
        match self.lookup.get(key) {
            Some(&k) => {
                self.data[date * self.lookup.len() + k] = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dates() -> Vec<NaiveDate> {
        vec![
            NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 2).unwrap(),
        ]
    }

    #[test]
    fn test_key_parse() {
        assert_eq!("Numeraire".parse::<ScenarioDataKey>().unwrap(), ScenarioDataKey::numeraire());
        assert_eq!(
            "FXSpot/EUR".parse::<ScenarioDataKey>().unwrap(),
            ScenarioDataKey::fx_spot("EUR")
        );
        assert!("FXSpot".parse::<ScenarioDataKey>().is_err());
        assert!("Vol/EUR".parse::<ScenarioDataKey>().is_err());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ScenarioDataKey::numeraire().to_string(), "Numeraire");
        assert_eq!(ScenarioDataKey::fx_spot("EUR").to_string(), "FXSpot/EUR");
    }

    #[test]
    fn test_set_get() {
        let keys = vec![ScenarioDataKey::numeraire(), ScenarioDataKey::fx_spot("EUR")];
        let mut data = AggregationScenarioData::new(dates(), 3, keys);
        data.set(1, 2, &ScenarioDataKey::fx_spot("EUR"), 1.09).unwrap();
        assert_relative_eq!(data.get(1, 2, &ScenarioDataKey::fx_spot("EUR")).unwrap(), 1.09);
        assert_relative_eq!(data.get(1, 2, &ScenarioDataKey::numeraire()).unwrap(), 0.0);
    }

    #[test]
    fn test_unknown_key() {
        let data = AggregationScenarioData::new(dates(), 3, vec![ScenarioDataKey::numeraire()]);
        let err = data.get(0, 0, &ScenarioDataKey::short_rate("USD")).unwrap_err();
        assert_eq!(err, CubeError::UnknownScenarioKey("ShortRate/USD".to_string()));
    }

    #[test]
    fn test_duplicate_keys_collapse() {
        let keys = vec![ScenarioDataKey::numeraire(), ScenarioDataKey::numeraire()];
        let data = AggregationScenarioData::new(dates(), 1, keys);
        assert_eq!(data.keys().len(), 1);
    }

    #[test]
    fn test_blocks_write_their_sample() {
        let keys = vec![ScenarioDataKey::numeraire(), ScenarioDataKey::short_rate("USD")];
        let mut data = AggregationScenarioData::new(dates(), 4, keys);
        for (sample, mut block) in data.sample_blocks_mut().into_iter().enumerate() {
            assert!(block
                .set(1, &ScenarioDataKey::numeraire(), 1.0 + sample as f64)
                .unwrap());
            assert!(!block.set(1, &ScenarioDataKey::fx_spot("GBP"), 1.0).unwrap());
        }
        assert_eq!(
            data.values_at(1, &ScenarioDataKey::numeraire()).unwrap(),
            vec![1.0, 2.0, 3.0, 4.0]
        );
        assert_eq!(
            data.values_at(0, &ScenarioDataKey::numeraire()).unwrap(),
            vec![0.0; 4]
        );
    }
}
