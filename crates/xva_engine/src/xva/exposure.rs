//! Exposure profiles from simulated netting set values.
//!
//! Inputs are discounted netting set values laid out as
//! `[sample][time]`, with the first time point at the as-of date.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::math::empirical_quantile;

/// Default PFE confidence level.
pub const DEFAULT_PFE_QUANTILE: f64 = 0.95;

/// Exposure statistics of one netting set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureProfile {
    /// Year fractions of the time points, starting at 0.
    pub times: Vec<f64>,
    /// Expected exposure per time point.
    pub ee: Vec<f64>,
    /// Expected negative exposure per time point.
    pub ene: Vec<f64>,
    /// Potential future exposure per time point.
    pub pfe: Vec<f64>,
    /// Time-averaged EE.
    pub epe: f64,
    /// Time-averaged effective EE over the first year.
    pub eepe: f64,
}

impl ExposureProfile {
    /// Computes every statistic from `values[sample][time]`.
    pub fn from_values(values: &[Vec<f64>], times: Vec<f64>, pfe_quantile: f64) -> Self {
        let ee = ExposureCalculator::expected_exposure(values);
        let ene = ExposureCalculator::expected_negative_exposure(values);
        let pfe = ExposureCalculator::potential_future_exposure(values, pfe_quantile);
        let epe = ExposureCalculator::expected_positive_exposure(&ee, &times);
        let eepe = ExposureCalculator::effective_epe(&ee, &times, 1.0);
        Self {
            times,
            ee,
            ene,
            pfe,
            epe,
            eepe,
        }
    }

    /// Largest PFE over the profile.
    #[inline]
    pub fn peak_pfe(&self) -> f64 {
        ExposureCalculator::peak_pfe(&self.pfe)
    }
}

/// Exposure metric calculations.
pub struct ExposureCalculator;

impl ExposureCalculator {
    /// Expected exposure at each time point.
    ///
    /// EE(t) = E[max(V(t), 0)]
    ///
    /// # Examples
    ///
    /// ```
    /// use xva_engine::xva::ExposureCalculator;
    ///
    /// let values = vec![
    ///     vec![10.0, 20.0, 15.0],
    ///     vec![5.0, -10.0, 25.0],
    ///     vec![-5.0, 15.0, 10.0],
    /// ];
    ///
    /// let ee = ExposureCalculator::expected_exposure(&values);
    /// assert!((ee[0] - 5.0).abs() < 1e-12);
    /// ```
    pub fn expected_exposure(values: &[Vec<f64>]) -> Vec<f64> {
        Self::mean_over_samples(values, |v| v.max(0.0))
    }

    /// Expected negative exposure at each time point, as a positive number.
    ///
    /// ENE(t) = E[max(-V(t), 0)]
    pub fn expected_negative_exposure(values: &[Vec<f64>]) -> Vec<f64> {
        Self::mean_over_samples(values, |v| (-v).max(0.0))
    }

    fn mean_over_samples(values: &[Vec<f64>], f: impl Fn(f64) -> f64 + Sync) -> Vec<f64> {
        let Some(first) = values.first() else {
            return Vec::new();
        };
        let n = values.len() as f64;
        (0..first.len())
            .into_par_iter()
            .map(|t| values.iter().map(|path| f(path[t])).sum::<f64>() / n)
            .collect()
    }

    /// Potential future exposure at `confidence`.
    ///
    /// PFE(t, α) = Quantile_α(max(V(t), 0))
    pub fn potential_future_exposure(values: &[Vec<f64>], confidence: f64) -> Vec<f64> {
        let Some(first) = values.first() else {
            return Vec::new();
        };
        (0..first.len())
            .into_par_iter()
            .map(|t| {
                let exposures: Vec<f64> = values.iter().map(|path| path[t].max(0.0)).collect();
                empirical_quantile(&exposures, confidence)
            })
            .collect()
    }

    /// Time-weighted average of EE (trapezoidal).
    ///
    /// EPE = (1/T) ∫₀ᵀ EE(t) dt
    pub fn expected_positive_exposure(ee: &[f64], times: &[f64]) -> f64 {
        if times.len() < 2 || ee.len() != times.len() {
            return ee.first().copied().unwrap_or(0.0);
        }
        let integral: f64 = times
            .windows(2)
            .zip(ee.windows(2))
            .map(|(t, e)| 0.5 * (e[0] + e[1]) * (t[1] - t[0]))
            .sum();
        let total = times[times.len() - 1] - times[0];
        if total > 0.0 {
            integral / total
        } else {
            ee[0]
        }
    }

    /// Non-decreasing EE profile.
    pub fn effective_ee(ee: &[f64]) -> Vec<f64> {
        ee.iter()
            .scan(0.0_f64, |running, &v| {
                *running = running.max(v);
                Some(*running)
            })
            .collect()
    }

    /// Effective EPE: time average of effective EE up to `horizon` years.
    pub fn effective_epe(ee: &[f64], times: &[f64], horizon: f64) -> f64 {
        if times.is_empty() || ee.len() != times.len() {
            return 0.0;
        }
        let eee = Self::effective_ee(ee);
        let mut integral = 0.0;
        let mut t_max = 0.0;
        for i in 0..times.len() - 1 {
            let t0 = times[i];
            if t0 >= horizon {
                break;
            }
            let t1 = times[i + 1].min(horizon);
            let dt = t1 - t0;
            if dt > 0.0 {
                integral += 0.5 * (eee[i] + eee[i + 1]) * dt;
                t_max = t1;
            }
        }
        if t_max > 0.0 {
            integral / t_max
        } else {
            eee[0]
        }
    }

    /// Maximum of a PFE profile, floored at zero.
    #[inline]
    pub fn peak_pfe(pfe: &[f64]) -> f64 {
        pfe.iter().copied().fold(0.0_f64, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_expected_exposure() {
        let values = vec![
            vec![10.0, 20.0, 15.0],
            vec![5.0, -10.0, 25.0],
            vec![-5.0, 15.0, 10.0],
        ];
        let ee = ExposureCalculator::expected_exposure(&values);
        assert_relative_eq!(ee[0], 5.0, epsilon = 1e-10);
        assert_relative_eq!(ee[1], 35.0 / 3.0, epsilon = 1e-10);
        assert_relative_eq!(ee[2], 50.0 / 3.0, epsilon = 1e-10);
        assert!(ExposureCalculator::expected_exposure(&[]).is_empty());
    }

    #[test]
    fn test_expected_negative_exposure() {
        let values = vec![vec![10.0, -20.0], vec![-5.0, -10.0], vec![15.0, 5.0]];
        let ene = ExposureCalculator::expected_negative_exposure(&values);
        assert_relative_eq!(ene[0], 5.0 / 3.0, epsilon = 1e-10);
        assert_relative_eq!(ene[1], 10.0, epsilon = 1e-10);
    }

    #[test]
    fn test_epe_trapezoid() {
        let ee = vec![0.0, 10.0, 20.0, 15.0, 5.0];
        let times = vec![0.0, 0.25, 0.5, 0.75, 1.0];
        assert_relative_eq!(
            ExposureCalculator::expected_positive_exposure(&ee, &times),
            11.875,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_pfe_quantile() {
        let values = vec![vec![10.0], vec![5.0], vec![15.0], vec![20.0], vec![25.0]];
        let pfe = ExposureCalculator::potential_future_exposure(&values, 0.80);
        assert_relative_eq!(pfe[0], 20.0, epsilon = 1e-10);
    }

    #[test]
    fn test_effective_epe_dominates_epe() {
        let ee = vec![10.0, 8.0, 12.0, 15.0, 10.0];
        let times = vec![0.0, 0.25, 0.5, 0.75, 1.0];
        assert_eq!(
            ExposureCalculator::effective_ee(&ee),
            vec![10.0, 10.0, 12.0, 15.0, 15.0]
        );
        let eepe = ExposureCalculator::effective_epe(&ee, &times, 1.0);
        let epe = ExposureCalculator::expected_positive_exposure(&ee, &times);
        assert!(eepe > epe);
    }

    #[test]
    fn test_profile() {
        let values = vec![vec![0.0, 4.0], vec![0.0, -2.0]];
        let profile = ExposureProfile::from_values(&values, vec![0.0, 1.0], 0.95);
        assert_eq!(profile.ee, vec![0.0, 2.0]);
        assert_eq!(profile.ene, vec![0.0, 1.0]);
        assert_eq!(profile.peak_pfe(), 4.0);
        assert_relative_eq!(profile.epe, 1.0);
    }
}
