//! Currencies, day counts and tenors.
//!
//! # Examples
//!
//! ```
//! use chrono::NaiveDate;
//! use xva_models::types::{Currency, DayCount, Tenor};
//!
//! let eur: Currency = "eur".parse().unwrap();
//! assert_eq!(eur.code(), "EUR");
//!
//! let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
//! let tenor: Tenor = "6M".parse().unwrap();
//! let end = tenor.advance(start).unwrap();
//! assert_eq!(end, NaiveDate::from_ymd_opt(2024, 7, 2).unwrap());
//!
//! let yf = DayCount::Act360.year_fraction(start, end);
//! assert!((yf - 182.0 / 360.0).abs() < 1e-12);
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{Days, Months, NaiveDate};
use thiserror::Error;

/// Failure to parse a currency, day count or tenor.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseTypeError {
    /// Unknown ISO 4217 code.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),
    /// Unknown day count name.
    #[error("Unknown day count: {0}")]
    UnknownDayCount(String),
    /// Malformed tenor string.
    #[error("Invalid tenor: {0}")]
    InvalidTenor(String),
}

/// ISO 4217 currency codes.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Currency {
    /// United States Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound Sterling
    GBP,
    /// Japanese Yen
    JPY,
    /// Swiss Franc
    CHF,
}

impl Currency {
    /// Returns the ISO 4217 three-letter currency code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CHF => "CHF",
        }
    }
}

impl FromStr for Currency {
    type Err = ParseTypeError;

    /// Parses an ISO 4217 code (case-insensitive).
    fn from_str(s: &str) -> Result<Self, ParseTypeError> {
        match s.to_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "JPY" => Ok(Currency::JPY),
            "CHF" => Ok(Currency::CHF),
            _ => Err(ParseTypeError::UnknownCurrency(s.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Day count convention used to turn dates into model time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DayCount {
    /// Actual/365 Fixed.
    #[default]
    Act365F,
    /// Actual/360.
    Act360,
}

impl DayCount {
    /// Year fraction between two dates; negative if `end` precedes `start`.
    #[inline]
    pub fn year_fraction(&self, start: NaiveDate, end: NaiveDate) -> f64 {
        let days = (end - start).num_days() as f64;
        match self {
            DayCount::Act365F => days / 365.0,
            DayCount::Act360 => days / 360.0,
        }
    }
}

impl FromStr for DayCount {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, ParseTypeError> {
        match s.to_uppercase().replace(|c: char| c == '/' || c == ' ', "").as_str() {
            "ACT365F" | "ACT365FIXED" | "A365F" => Ok(DayCount::Act365F),
            "ACT360" | "A360" => Ok(DayCount::Act360),
            _ => Err(ParseTypeError::UnknownDayCount(s.to_string())),
        }
    }
}

/// Unit of a [`Tenor`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TenorUnit {
    /// Calendar days.
    Days,
    /// Weeks of seven days.
    Weeks,
    /// Calendar months.
    Months,
    /// Calendar years.
    Years,
}

/// Period such as `2W`, `3M` or `10Y`, used to build simulation grids.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct Tenor {
    length: u32,
    unit: TenorUnit,
}

impl Tenor {
    /// Creates a tenor.
    pub fn new(length: u32, unit: TenorUnit) -> Self {
        Self { length, unit }
    }

    /// Number of units.
    #[inline]
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Unit.
    #[inline]
    pub fn unit(&self) -> TenorUnit {
        self.unit
    }

    /// Adds the tenor to `date` (unadjusted, end-of-month clamped).
    ///
    /// Returns `None` if the result is outside chrono's date range.
    pub fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        let n = self.length;
        match self.unit {
            TenorUnit::Days => date.checked_add_days(Days::new(u64::from(n))),
            TenorUnit::Weeks => date.checked_add_days(Days::new(7 * u64::from(n))),
            TenorUnit::Months => date.checked_add_months(Months::new(n)),
            TenorUnit::Years => date.checked_add_months(Months::new(12 * n)),
        }
    }
}

impl FromStr for Tenor {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, ParseTypeError> {
        let trimmed = s.trim();
        let invalid = || ParseTypeError::InvalidTenor(s.to_string());
        let mut chars = trimmed.chars();
        let unit = match chars.next_back().map(|c| c.to_ascii_uppercase()) {
            Some('D') => TenorUnit::Days,
            Some('W') => TenorUnit::Weeks,
            Some('M') => TenorUnit::Months,
            Some('Y') => TenorUnit::Years,
            _ => return Err(invalid()),
        };
        let length: u32 = chars.as_str().parse().map_err(|_| invalid())?;
        if length == 0 {
            return Err(invalid());
        }
        Ok(Self { length, unit })
    }
}

impl TryFrom<String> for Tenor {
    type Error = ParseTypeError;

    fn try_from(value: String) -> Result<Self, ParseTypeError> {
        value.parse()
    }
}

impl From<Tenor> for String {
    fn from(value: Tenor) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Tenor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            TenorUnit::Days => "D",
            TenorUnit::Weeks => "W",
            TenorUnit::Months => "M",
            TenorUnit::Years => "Y",
        };
        write!(f, "{}{}", self.length, unit)
    }
}
