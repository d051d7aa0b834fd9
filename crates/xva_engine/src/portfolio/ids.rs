//! Identifier newtypes for trades, counterparties and netting sets.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an id.
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the id as a string slice.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Trade identifier; also the id of the trade's row in the NPV cube.
    ///
    /// # Examples
    ///
    /// ```
    /// use xva_engine::portfolio::TradeId;
    ///
    /// let id = TradeId::new("SWAP_1");
    /// assert_eq!(id.as_str(), "SWAP_1");
    /// ```
    TradeId
}

string_id! {
    /// Counterparty identifier; also the name of its credit curve.
    CounterpartyId
}

string_id! {
    /// Netting set identifier; also the id of the set's row in the netting cube.
    NettingSetId
}
