//! Netting set definitions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::ids::{CounterpartyId, NettingSetId};
use crate::error::PortfolioError;

/// Netting agreement with one counterparty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NettingSetDefinition {
    /// Netting set id.
    pub id: NettingSetId,
    /// Counterparty of the agreement.
    pub counterparty: CounterpartyId,
}

/// Set of netting agreements, keyed by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NettingSetDefinitions(Vec<NettingSetDefinition>);

impl NettingSetDefinitions {
    /// Wraps definitions, rejecting duplicate ids.
    pub fn new(definitions: Vec<NettingSetDefinition>) -> Result<Self, PortfolioError> {
        let defs = Self(definitions);
        defs.validate()?;
        Ok(defs)
    }

    /// Checks that ids are unique.
    pub fn validate(&self) -> Result<(), PortfolioError> {
        let mut seen = HashSet::with_capacity(self.0.len());
        for def in &self.0 {
            if !seen.insert(&def.id) {
                return Err(PortfolioError::DuplicateNettingSet(def.id.to_string()));
            }
        }
        Ok(())
    }

    /// Definition of a netting set.
    pub fn get(&self, id: &NettingSetId) -> Option<&NettingSetDefinition> {
        self.0.iter().find(|d| &d.id == id)
    }

    /// All definitions.
    #[inline]
    pub fn definitions(&self) -> &[NettingSetDefinition] {
        &self.0
    }

    /// Number of definitions.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no definitions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str, cp: &str) -> NettingSetDefinition {
        NettingSetDefinition {
            id: NettingSetId::new(id),
            counterparty: CounterpartyId::new(cp),
        }
    }

    #[test]
    fn test_lookup() {
        let defs = NettingSetDefinitions::new(vec![def("NS_A", "CP_A"), def("NS_B", "CP_B")]).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(
            defs.get(&NettingSetId::new("NS_B")).unwrap().counterparty.as_str(),
            "CP_B"
        );
        assert!(defs.get(&NettingSetId::new("NS_C")).is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = NettingSetDefinitions::new(vec![def("NS_A", "CP_A"), def("NS_A", "CP_B")]).unwrap_err();
        assert_eq!(err, PortfolioError::DuplicateNettingSet("NS_A".to_string()));
    }
}
