//! Trade-level to netting-set-level aggregation.

use chrono::NaiveDate;
use rayon::prelude::*;

use crate::cube::{NpvCube, SampleBlock, SampleBlockMut, ValuationCube};
use crate::error::CubeError;

/// How a depth slot of the trade cube combines into the netting cube.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NettingRule {
    /// Values of all trades in the netting set are added.
    #[default]
    Sum,
    /// The slot is not aggregated and keeps the fill value.
    Skip,
}

fn check_mapping(
    num_trades: usize,
    trade_to_netting: &[usize],
    num_netting_sets: usize,
    depth: usize,
    rules: &[NettingRule],
) -> Result<(), CubeError> {
    if trade_to_netting.len() != num_trades {
        return Err(CubeError::InvalidDimensions(format!(
            "netting map covers {} trades, cube has {}",
            trade_to_netting.len(),
            num_trades
        )));
    }
    if let Some(&bad) = trade_to_netting.iter().find(|&&ns| ns >= num_netting_sets) {
        return Err(CubeError::InvalidDimensions(format!(
            "netting set index {} out of range ({} netting sets)",
            bad, num_netting_sets
        )));
    }
    if rules.len() != depth {
        return Err(CubeError::InvalidDimensions(format!(
            "{} netting rules for cube depth {}",
            rules.len(),
            depth
        )));
    }
    Ok(())
}

/// Combines one sample of a trade cube into the same sample of a netting cube.
///
/// `trade_to_netting[t]` is the netting cube id index of trade `t`, and
/// `rules[d]` decides how depth slot `d` combines. Sums are taken in `f64`.
/// Netting sets without trades are left untouched.
pub fn combine_sample(
    trades: SampleBlock<'_>,
    netting: &mut SampleBlockMut<'_>,
    trade_to_netting: &[usize],
    rules: &[NettingRule],
) -> Result<(), CubeError> {
    check_mapping(
        trades.num_ids(),
        trade_to_netting,
        netting.num_ids(),
        netting.depth(),
        rules,
    )?;

    let n_sets = netting.num_ids();
    let mut sums = vec![0.0_f64; n_sets];
    let mut touched = vec![false; n_sets];
    for &ns in trade_to_netting {
        touched[ns] = true;
    }

    for (slot, rule) in rules.iter().enumerate() {
        if *rule == NettingRule::Skip {
            continue;
        }
        for date in 0..netting.num_dates() {
            sums.iter_mut().for_each(|s| *s = 0.0);
            for (trade, &ns) in trade_to_netting.iter().enumerate() {
                sums[ns] += trades.get(trade, date, slot)?;
            }
            for ns in 0..n_sets {
                if touched[ns] {
                    netting.set(ns, date, slot, sums[ns])?;
                }
            }
        }
    }
    Ok(())
}

/// Builds netting cubes from complete trade cubes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NettingAggregator;

impl NettingAggregator {
    /// Creates an aggregator.
    pub fn new() -> Self {
        Self
    }

    /// Aggregates `trade_cube` to a netting cube with ids `netting_ids`.
    ///
    /// The netting cube shares the trade cube's dates, samples, depth and fill
    /// value. The t0 slot is aggregated with the same rules. Samples are
    /// processed in parallel.
    ///
    /// # Errors
    ///
    /// `CubeError::InvalidDimensions` if the mapping does not cover every trade,
    /// points outside `netting_ids`, or the rules do not match the depth.
    pub fn aggregate(
        &self,
        trade_cube: &ValuationCube,
        trade_to_netting: &[usize],
        netting_ids: Vec<String>,
        rules: &[NettingRule],
    ) -> Result<ValuationCube, CubeError> {
        check_mapping(
            trade_cube.num_ids(),
            trade_to_netting,
            netting_ids.len(),
            trade_cube.depth(),
            rules,
        )?;

        let dates: Vec<NaiveDate> = trade_cube.dates().to_vec();
        let mut netting = ValuationCube::allocate(
            trade_cube.asof(),
            netting_ids,
            dates,
            trade_cube.samples(),
            trade_cube.depth(),
            trade_cube.fill_value(),
        )?;

        self.aggregate_t0(trade_cube, &mut netting, trade_to_netting, rules)?;

        let trade_blocks = trade_cube.sample_blocks();
        netting
            .sample_blocks_mut()
            .into_par_iter()
            .zip(trade_blocks.into_par_iter())
            .try_for_each(|(mut target, source)| {
                combine_sample(source, &mut target, trade_to_netting, rules)
            })?;

        Ok(netting)
    }

    /// Aggregates the t0 slots of `trade_cube` into an existing netting cube.
    ///
    /// Netting sets without trades keep their t0 values.
    pub fn aggregate_t0(
        &self,
        trade_cube: &ValuationCube,
        netting: &mut ValuationCube,
        trade_to_netting: &[usize],
        rules: &[NettingRule],
    ) -> Result<(), CubeError> {
        let n_sets = netting.num_ids();
        for (slot, rule) in rules.iter().enumerate() {
            if *rule == NettingRule::Skip {
                continue;
            }
            let mut sums = vec![None::<f64>; n_sets];
            for (trade, &ns) in trade_to_netting.iter().enumerate() {
                let v = trade_cube.get_t0(trade, slot)?;
                *sums[ns].get_or_insert(0.0) += v;
            }
            for (ns, sum) in sums.into_iter().enumerate() {
                if let Some(sum) = sum {
                    netting.set_t0(ns, slot, sum)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn trade_cube(depth: usize) -> ValuationCube {
        let asof = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let dates = vec![
            NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 2).unwrap(),
        ];
        let ids = vec!["T1".to_string(), "T2".to_string(), "T3".to_string()];
        ValuationCube::allocate(asof, ids, dates, 4, depth, 0.0).unwrap()
    }

    #[test]
    fn test_sum_per_netting_set() {
        let mut cube = trade_cube(1);
        for s in 0..4 {
            for d in 0..2 {
                cube.set(0, d, s, 0, 1.0 + s as f64).unwrap();
                cube.set(1, d, s, 0, 10.0).unwrap();
                cube.set(2, d, s, 0, -3.5).unwrap();
            }
        }
        cube.set_t0(0, 0, 2.0).unwrap();
        cube.set_t0(1, 0, 3.0).unwrap();

        let netting = NettingAggregator::new()
            .aggregate(
                &cube,
                &[0, 0, 1],
                vec!["NS1".to_string(), "NS2".to_string()],
                &[NettingRule::Sum],
            )
            .unwrap();

        for s in 0..4 {
            assert_relative_eq!(netting.get(0, 1, s, 0).unwrap(), 11.0 + s as f64);
            assert_relative_eq!(netting.get(1, 1, s, 0).unwrap(), -3.5);
        }
        assert_relative_eq!(netting.get_t0(0, 0).unwrap(), 5.0);
    }

    #[test]
    fn test_empty_netting_set_keeps_fill() {
        let asof = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let dates = vec![NaiveDate::from_ymd_opt(2024, 4, 2).unwrap()];
        let mut cube =
            ValuationCube::allocate(asof, vec!["T1".to_string()], dates, 2, 1, -99.0).unwrap();
        cube.set(0, 0, 0, 0, 4.0).unwrap();

        let netting = NettingAggregator::new()
            .aggregate(
                &cube,
                &[0],
                vec!["NS1".to_string(), "EMPTY".to_string()],
                &[NettingRule::Sum],
            )
            .unwrap();

        assert_eq!(netting.get(0, 0, 0, 0).unwrap(), 4.0);
        assert_eq!(netting.get(1, 0, 0, 0).unwrap(), -99.0);
        assert_eq!(netting.get(1, 0, 1, 0).unwrap(), -99.0);
        assert_eq!(netting.get_t0(1, 0).unwrap(), -99.0);
    }

    #[test]
    fn test_skip_rule_leaves_slot() {
        let mut cube = trade_cube(2);
        cube.set(0, 0, 0, 1, 8.0).unwrap();
        let netting = NettingAggregator::new()
            .aggregate(
                &cube,
                &[0, 0, 0],
                vec!["NS1".to_string()],
                &[NettingRule::Sum, NettingRule::Skip],
            )
            .unwrap();
        assert_eq!(netting.get(0, 0, 0, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_mapping_errors() {
        let cube = trade_cube(1);
        let agg = NettingAggregator::new();
        assert!(agg
            .aggregate(&cube, &[0, 0], vec!["NS1".to_string()], &[NettingRule::Sum])
            .is_err());
        assert!(agg
            .aggregate(&cube, &[0, 0, 2], vec!["NS1".to_string()], &[NettingRule::Sum])
            .is_err());
        assert!(agg
            .aggregate(
                &cube,
                &[0, 0, 0],
                vec!["NS1".to_string()],
                &[NettingRule::Sum, NettingRule::Sum]
            )
            .is_err());
    }
}
