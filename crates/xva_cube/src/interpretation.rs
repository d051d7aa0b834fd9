//! Cube layout and interpretation.
//!
//! The meaning of each depth slot lives here and nowhere else: calculators
//! receive their write index from a [`CubeLayout`], and readers go through a
//! [`CubeInterpretation`].
//!
//! | Mode | depth | slot 0 | slot 1 |
//! |------|-------|--------|--------|
//! | Regular | 1 | NPV | - |
//! | Regular with flows | 2 | NPV | cash flow until next date |
//! | Close-out lag | 2 | default-date NPV | close-out NPV |

use chrono::NaiveDate;

use crate::cube::NpvCube;
use crate::error::CubeError;

/// Depth assignment of a cube.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CubeLayout {
    depth: usize,
    npv_index: usize,
    close_out_index: Option<usize>,
    flow_index: Option<usize>,
}

impl CubeLayout {
    /// Layout of a regular run, optionally storing cash flows.
    pub fn regular(store_flows: bool) -> Self {
        if store_flows {
            Self {
                depth: 2,
                npv_index: 0,
                close_out_index: None,
                flow_index: Some(1),
            }
        } else {
            Self {
                depth: 1,
                npv_index: 0,
                close_out_index: None,
                flow_index: None,
            }
        }
    }

    /// Layout of a run on a close-out lag grid.
    pub fn close_out_lag() -> Self {
        Self {
            depth: 2,
            npv_index: 0,
            close_out_index: Some(1),
            flow_index: None,
        }
    }

    /// Cube depth required.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Slot of the (default-date) NPV.
    #[inline]
    pub fn npv_index(&self) -> usize {
        self.npv_index
    }

    /// Slot of the close-out NPV, if stored separately.
    #[inline]
    pub fn close_out_index(&self) -> Option<usize> {
        self.close_out_index
    }

    /// Slot of the cash flows, if stored.
    #[inline]
    pub fn flow_index(&self) -> Option<usize> {
        self.flow_index
    }
}

/// Semantic accessor over a valuation or netting cube.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CubeInterpretation {
    /// One date grid; the close-out value is read from the next date.
    Regular {
        /// Whether slot 1 holds cash flows.
        store_flows: bool,
    },
    /// Valuation dates paired with close-out dates (the "NoLag" calculation).
    MporGrid {
        /// Calendar days between a valuation date and its close-out date.
        close_out_lag_days: i64,
    },
}

impl CubeInterpretation {
    /// Layout written by a run using this interpretation.
    pub fn layout(&self) -> CubeLayout {
        match self {
            CubeInterpretation::Regular { store_flows } => CubeLayout::regular(*store_flows),
            CubeInterpretation::MporGrid { .. } => CubeLayout::close_out_lag(),
        }
    }

    /// True for the close-out lag variant.
    #[inline]
    pub fn with_close_out_lag(&self) -> bool {
        matches!(self, CubeInterpretation::MporGrid { .. })
    }

    /// True if the cube stores cash flows.
    #[inline]
    pub fn has_flows(&self) -> bool {
        self.layout().flow_index().is_some()
    }

    /// NPV on the default date.
    pub fn default_date_npv<C: NpvCube + ?Sized>(
        &self,
        cube: &C,
        id: usize,
        date: usize,
        sample: usize,
    ) -> Result<f64, CubeError> {
        cube.get(id, date, sample, self.layout().npv_index())
    }

    /// NPV on the close-out date associated with `date`.
    ///
    /// Regular cubes read the next valuation date; the last date maps to
    /// itself.
    pub fn close_out_npv<C: NpvCube + ?Sized>(
        &self,
        cube: &C,
        id: usize,
        date: usize,
        sample: usize,
    ) -> Result<f64, CubeError> {
        let layout = self.layout();
        match layout.close_out_index() {
            Some(slot) => cube.get(id, date, sample, slot),
            None => {
                let last = cube.num_dates().saturating_sub(1);
                cube.get(id, (date + 1).min(last), sample, layout.npv_index())
            }
        }
    }

    /// Cash flows paid between `date` and its close-out date, zero if flows
    /// are not stored.
    pub fn flows<C: NpvCube + ?Sized>(
        &self,
        cube: &C,
        id: usize,
        date: usize,
        sample: usize,
    ) -> Result<f64, CubeError> {
        match self.layout().flow_index() {
            Some(slot) => cube.get(id, date, sample, slot),
            None => {
                // still validate the coordinates
                cube.get(id, date, sample, 0)?;
                Ok(0.0)
            }
        }
    }

    /// Calendar days between valuation date `date` and its close-out date.
    ///
    /// Regular cubes use the distance to the next date; the last date, with
    /// nothing after it, has a zero horizon.
    pub fn close_out_horizon_days(&self, dates: &[NaiveDate], date: usize) -> i64 {
        match self {
            CubeInterpretation::MporGrid { close_out_lag_days } => *close_out_lag_days,
            CubeInterpretation::Regular { .. } => match (dates.get(date), dates.get(date + 1)) {
                (Some(d0), Some(d1)) => (*d1 - *d0).num_days(),
                _ => 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::ValuationCube;

    fn cube(depth: usize) -> ValuationCube {
        let asof = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let dates = vec![
            NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
        ];
        ValuationCube::allocate(asof, vec!["N1".to_string()], dates, 2, depth, 0.0).unwrap()
    }

    #[test]
    fn test_layouts() {
        assert_eq!(CubeLayout::regular(false).depth(), 1);
        let flows = CubeLayout::regular(true);
        assert_eq!(flows.depth(), 2);
        assert_eq!(flows.flow_index(), Some(1));
        let lag = CubeLayout::close_out_lag();
        assert_eq!(lag.close_out_index(), Some(1));
        assert_ne!(lag.npv_index(), 1);
    }

    #[test]
    fn test_no_lag_round_trip() {
        let interp = CubeInterpretation::MporGrid {
            close_out_lag_days: 14,
        };
        let mut c = cube(interp.layout().depth());
        c.set(0, 1, 1, 0, 100.0).unwrap();
        c.set(0, 1, 1, 1, 104.0).unwrap();

        assert_eq!(interp.default_date_npv(&c, 0, 1, 1).unwrap(), 100.0);
        assert_eq!(interp.close_out_npv(&c, 0, 1, 1).unwrap(), 104.0);
        assert_eq!(interp.flows(&c, 0, 1, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_regular_close_out_is_next_date() {
        let interp = CubeInterpretation::Regular { store_flows: false };
        let mut c = cube(1);
        c.set(0, 0, 0, 0, 1.0).unwrap();
        c.set(0, 1, 0, 0, 2.0).unwrap();
        c.set(0, 2, 0, 0, 3.0).unwrap();

        assert_eq!(interp.close_out_npv(&c, 0, 0, 0).unwrap(), 2.0);
        assert_eq!(interp.close_out_npv(&c, 0, 2, 0).unwrap(), 3.0);
    }

    #[test]
    fn test_regular_flows() {
        let interp = CubeInterpretation::Regular { store_flows: true };
        let mut c = cube(2);
        c.set(0, 0, 1, 1, -5.0).unwrap();
        assert!(interp.has_flows());
        assert_eq!(interp.flows(&c, 0, 0, 1).unwrap(), -5.0);
    }

    #[test]
    fn test_flows_checks_coordinates() {
        let interp = CubeInterpretation::Regular { store_flows: false };
        let c = cube(1);
        assert!(interp.flows(&c, 3, 0, 0).is_err());
    }

    #[test]
    fn test_horizon_days() {
        let c = cube(1);
        let regular = CubeInterpretation::Regular { store_flows: false };
        assert_eq!(regular.close_out_horizon_days(c.dates(), 0), 29);
        assert_eq!(regular.close_out_horizon_days(c.dates(), 2), 0);
        let lag = CubeInterpretation::MporGrid {
            close_out_lag_days: 10,
        };
        assert_eq!(lag.close_out_horizon_days(c.dates(), 2), 10);
    }
}
