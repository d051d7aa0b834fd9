//! Simulation date grid, with optional close-out dates.
//!
//! With a close-out lag each valuation date `d` is paired with a close-out
//! date `d + lag`. Scenario paths visit the union of both sets in date order;
//! the cube only has slots for valuation dates.

use chrono::{Days, NaiveDate};

use crate::error::ModelError;
use crate::types::Tenor;

/// Whether a grid point is a valuation or a close-out date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GridPointKind {
    /// Default (valuation) date with its own cube slot.
    Valuation,
    /// Close-out date written into the close-out slot of its valuation date.
    CloseOut,
}

/// One step of a scenario path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridPoint {
    /// Date of the step.
    pub date: NaiveDate,
    /// Kind of the step.
    pub kind: GridPointKind,
    /// Index of the associated valuation date.
    pub valuation_index: usize,
}

/// Valuation dates plus close-out dates, in path order.
#[derive(Clone, Debug, PartialEq)]
pub struct DateGrid {
    asof: NaiveDate,
    valuation_dates: Vec<NaiveDate>,
    close_out_lag_days: Option<i64>,
    points: Vec<GridPoint>,
}

impl DateGrid {
    /// Creates a grid.
    ///
    /// # Errors
    ///
    /// `ModelError::InvalidGrid` if `valuation_dates` is empty, not strictly
    /// increasing, not after `asof`, or the lag is not positive.
    pub fn new(
        asof: NaiveDate,
        valuation_dates: Vec<NaiveDate>,
        close_out_lag_days: Option<i64>,
    ) -> Result<Self, ModelError> {
        if valuation_dates.is_empty() {
            return Err(ModelError::InvalidGrid("no valuation dates".to_string()));
        }
        if valuation_dates[0] <= asof {
            return Err(ModelError::InvalidGrid(format!(
                "first valuation date {} is not after as-of date {}",
                valuation_dates[0], asof
            )));
        }
        if valuation_dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ModelError::InvalidGrid(
                "valuation dates must be strictly increasing".to_string(),
            ));
        }

        let mut points: Vec<GridPoint> = valuation_dates
            .iter()
            .enumerate()
            .map(|(i, &date)| GridPoint {
                date,
                kind: GridPointKind::Valuation,
                valuation_index: i,
            })
            .collect();

        if let Some(lag) = close_out_lag_days {
            if lag <= 0 {
                return Err(ModelError::InvalidGrid(format!(
                    "close-out lag must be positive, got {} days",
                    lag
                )));
            }
            for (i, &date) in valuation_dates.iter().enumerate() {
                let close_out = date
                    .checked_add_days(Days::new(lag as u64))
                    .ok_or_else(|| ModelError::InvalidGrid(format!("close-out date after {} out of range", date)))?;
                points.push(GridPoint {
                    date: close_out,
                    kind: GridPointKind::CloseOut,
                    valuation_index: i,
                });
            }
            // valuation before close-out on the same day
            points.sort_by_key(|p| (p.date, p.kind));
        }

        Ok(Self {
            asof,
            valuation_dates,
            close_out_lag_days,
            points,
        })
    }

    /// As-of date.
    #[inline]
    pub fn asof(&self) -> NaiveDate {
        self.asof
    }

    /// Valuation dates (cube date axis).
    #[inline]
    pub fn valuation_dates(&self) -> &[NaiveDate] {
        &self.valuation_dates
    }

    /// Close-out lag in calendar days, if configured.
    #[inline]
    pub fn close_out_lag_days(&self) -> Option<i64> {
        self.close_out_lag_days
    }

    /// True if close-out dates are simulated.
    #[inline]
    pub fn with_close_out_lag(&self) -> bool {
        self.close_out_lag_days.is_some()
    }

    /// Path steps in date order.
    #[inline]
    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    /// Close-out dates, one per valuation date.
    pub fn close_out_dates(&self) -> Vec<NaiveDate> {
        self.points
            .iter()
            .filter(|p| p.kind == GridPointKind::CloseOut)
            .map(|p| p.date)
            .collect()
    }
}

fn default_samples() -> usize {
    1000
}

fn default_seed() -> u64 {
    42
}

/// Scenario generator configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScenarioGeneratorData {
    /// Grid tenors from the as-of date.
    pub grid: Vec<Tenor>,
    /// Number of Monte Carlo samples.
    #[cfg_attr(feature = "serde", serde(default = "default_samples"))]
    pub samples: usize,
    /// Run seed.
    #[cfg_attr(feature = "serde", serde(default = "default_seed"))]
    pub seed: u64,
    /// Close-out lag in calendar days; `None` for a regular grid.
    #[cfg_attr(feature = "serde", serde(default))]
    pub close_out_lag_days: Option<i64>,
    /// Keep the evaluation date on the default date while pricing close-out
    /// scenarios.
    #[cfg_attr(feature = "serde", serde(default))]
    pub mpor_sticky_date: bool,
}

impl Default for ScenarioGeneratorData {
    fn default() -> Self {
        Self {
            grid: Vec::new(),
            samples: default_samples(),
            seed: default_seed(),
            close_out_lag_days: None,
            mpor_sticky_date: false,
        }
    }
}

impl ScenarioGeneratorData {
    /// Builds the date grid for a run as of `asof`.
    pub fn date_grid(&self, asof: NaiveDate) -> Result<DateGrid, ModelError> {
        let dates = self
            .grid
            .iter()
            .map(|t| {
                t.advance(asof)
                    .ok_or_else(|| ModelError::InvalidGrid(format!("tenor {} out of range", t)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        DateGrid::new(asof, dates, self.close_out_lag_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TenorUnit;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_regular_grid() {
        let grid = DateGrid::new(d(2024, 1, 2), vec![d(2024, 2, 2), d(2024, 3, 2)], None).unwrap();
        assert_eq!(grid.points().len(), 2);
        assert!(!grid.with_close_out_lag());
        assert!(grid.close_out_dates().is_empty());
    }

    #[test]
    fn test_close_out_points_interleave() {
        let grid = DateGrid::new(
            d(2024, 1, 2),
            vec![d(2024, 2, 2), d(2024, 2, 5)],
            Some(7),
        )
        .unwrap();
        let kinds: Vec<(NaiveDate, GridPointKind, usize)> = grid
            .points()
            .iter()
            .map(|p| (p.date, p.kind, p.valuation_index))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (d(2024, 2, 2), GridPointKind::Valuation, 0),
                (d(2024, 2, 5), GridPointKind::Valuation, 1),
                (d(2024, 2, 9), GridPointKind::CloseOut, 0),
                (d(2024, 2, 12), GridPointKind::CloseOut, 1),
            ]
        );
        assert_eq!(grid.close_out_dates(), vec![d(2024, 2, 9), d(2024, 2, 12)]);
    }

    #[test]
    fn test_coinciding_dates_put_valuation_first() {
        let grid = DateGrid::new(
            d(2024, 1, 2),
            vec![d(2024, 2, 2), d(2024, 2, 9)],
            Some(7),
        )
        .unwrap();
        let p = &grid.points()[1..3];
        assert_eq!(p[0].kind, GridPointKind::Valuation);
        assert_eq!(p[1].kind, GridPointKind::CloseOut);
        assert_eq!(p[0].date, p[1].date);
    }

    #[test]
    fn test_invalid_grids() {
        let asof = d(2024, 1, 2);
        assert!(DateGrid::new(asof, vec![], None).is_err());
        assert!(DateGrid::new(asof, vec![asof], None).is_err());
        assert!(DateGrid::new(asof, vec![d(2024, 3, 1), d(2024, 2, 1)], None).is_err());
        assert!(DateGrid::new(asof, vec![d(2024, 3, 1)], Some(0)).is_err());
    }

    #[test]
    fn test_generator_data_grid() {
        let data = ScenarioGeneratorData {
            grid: vec![Tenor::new(3, TenorUnit::Months), Tenor::new(1, TenorUnit::Years)],
            ..Default::default()
        };
        let grid = data.date_grid(d(2024, 1, 2)).unwrap();
        assert_eq!(grid.valuation_dates(), &[d(2024, 4, 2), d(2025, 1, 2)]);
        assert_eq!(data.samples, 1000);
    }
}
