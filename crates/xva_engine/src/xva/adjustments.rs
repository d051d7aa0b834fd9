//! Valuation adjustments from discounted exposure profiles.
//!
//! # Formulas
//!
//! ```text
//! CVA = LGD_c × Σ ½(EE_i + EE_{i+1}) × PD_c(t_i, t_{i+1})
//! DVA = LGD_o × Σ ½(ENE_i + ENE_{i+1}) × PD_o(t_i, t_{i+1})
//! FCA = s_b × Σ ½(EE_i + EE_{i+1}) × Δt_i
//! FBA = s_l × Σ ½(ENE_i + ENE_{i+1}) × Δt_i
//! MVA = s_b × Σ ½(DIM_i + DIM_{i+1}) × Δt_i
//! KVA = CoC × Σ ½(K_i + K_{i+1}) × Δt_i,   K = ratio × rw × α × EEE
//! ```
//!
//! Exposures are already discounted by the simulated numeraire, so no
//! separate discount factor appears.

use serde::{Deserialize, Serialize};
use xva_models::CreditCurve;

use super::exposure::ExposureCalculator;

/// Hazard rate bump for CVA spread sensitivity.
pub const CS01_BUMP: f64 = 1e-4;

fn integrate(profile: &[f64], times: &[f64], weight: impl Fn(f64, f64) -> f64) -> f64 {
    if times.len() < 2 || profile.len() != times.len() {
        return 0.0;
    }
    times
        .windows(2)
        .zip(profile.windows(2))
        .map(|(t, p)| 0.5 * (p[0] + p[1]) * weight(t[0], t[1]))
        .sum()
}

/// Unilateral CVA of an EE profile.
///
/// # Examples
///
/// ```
/// use xva_engine::xva::compute_cva;
/// use xva_models::CreditCurve;
///
/// let ee = vec![0.0, 100.0, 150.0, 100.0, 50.0];
/// let times = vec![0.0, 0.25, 0.5, 0.75, 1.0];
/// let curve = CreditCurve { hazard_rate: 0.02, recovery: 0.4 };
///
/// assert!(compute_cva(&ee, &times, &curve) > 0.0);
/// ```
pub fn compute_cva(ee: &[f64], times: &[f64], counterparty: &CreditCurve) -> f64 {
    let lgd = counterparty.lgd();
    integrate(ee, times, |t1, t2| {
        lgd * counterparty.marginal_default_probability(t1, t2)
    })
    .max(0.0)
}

/// DVA of an ENE profile against the own credit curve.
pub fn compute_dva(ene: &[f64], times: &[f64], own: &CreditCurve) -> f64 {
    compute_cva(ene, times, own)
}

/// Funding cost of positive exposure.
pub fn compute_fca(ee: &[f64], times: &[f64], borrowing_spread: f64) -> f64 {
    integrate(ee, times, |t1, t2| borrowing_spread * (t2 - t1)).max(0.0)
}

/// Funding benefit of negative exposure.
pub fn compute_fba(ene: &[f64], times: &[f64], lending_spread: f64) -> f64 {
    integrate(ene, times, |t1, t2| lending_spread * (t2 - t1)).max(0.0)
}

/// Cost of funding the expected initial margin profile.
pub fn compute_mva(expected_dim: &[f64], times: &[f64], borrowing_spread: f64) -> f64 {
    integrate(expected_dim, times, |t1, t2| borrowing_spread * (t2 - t1)).max(0.0)
}

/// Change in CVA for a one basis point parallel hazard rate bump.
pub fn compute_cva_cs01(ee: &[f64], times: &[f64], counterparty: &CreditCurve) -> f64 {
    let bumped = CreditCurve {
        hazard_rate: counterparty.hazard_rate + CS01_BUMP,
        ..*counterparty
    };
    compute_cva(ee, times, &bumped) - compute_cva(ee, times, counterparty)
}

fn default_cost_of_capital() -> f64 {
    0.10
}

fn default_capital_ratio() -> f64 {
    0.08
}

fn default_alpha() -> f64 {
    1.4
}

fn default_risk_weight() -> f64 {
    1.0
}

/// Capital proxy parameters for KVA.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KvaParams {
    /// Annual cost of capital.
    #[serde(default = "default_cost_of_capital")]
    pub cost_of_capital: f64,
    /// Capital ratio applied to risk-weighted exposure.
    #[serde(default = "default_capital_ratio")]
    pub capital_ratio: f64,
    /// Regulatory alpha multiplier on effective EE.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Counterparty risk weight.
    #[serde(default = "default_risk_weight")]
    pub risk_weight: f64,
}

impl Default for KvaParams {
    fn default() -> Self {
        Self {
            cost_of_capital: default_cost_of_capital(),
            capital_ratio: default_capital_ratio(),
            alpha: default_alpha(),
            risk_weight: default_risk_weight(),
        }
    }
}

impl KvaParams {
    /// Capital profile implied by an EE profile.
    pub fn capital_profile(&self, ee: &[f64]) -> Vec<f64> {
        let factor = self.capital_ratio * self.risk_weight * self.alpha;
        ExposureCalculator::effective_ee(ee)
            .into_iter()
            .map(|e| factor * e)
            .collect()
    }
}

/// Cost of holding capital against the counterparty exposure.
pub fn compute_kva(ee: &[f64], times: &[f64], params: &KvaParams) -> f64 {
    let capital = params.capital_profile(ee);
    integrate(&capital, times, |t1, t2| params.cost_of_capital * (t2 - t1)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn curve(hazard_rate: f64, recovery: f64) -> CreditCurve {
        CreditCurve {
            hazard_rate,
            recovery,
        }
    }

    fn flat() -> (Vec<f64>, Vec<f64>) {
        (vec![100.0; 5], vec![0.0, 0.25, 0.5, 0.75, 1.0])
    }

    #[test]
    fn test_cva_flat_exposure() {
        let (ee, times) = flat();
        let c = curve(0.02, 0.4);
        let expected = 0.6 * 100.0 * (1.0 - (-0.02_f64).exp());
        assert_relative_eq!(compute_cva(&ee, &times, &c), expected, epsilon = 1e-10);
    }

    #[test]
    fn test_cva_monotone_in_hazard_and_lgd() {
        let (ee, times) = flat();
        assert!(compute_cva(&ee, &times, &curve(0.05, 0.4)) > compute_cva(&ee, &times, &curve(0.01, 0.4)));
        let low = compute_cva(&ee, &times, &curve(0.02, 0.6));
        let high = compute_cva(&ee, &times, &curve(0.02, 0.2));
        assert_relative_eq!(high / low, 2.0, max_relative = 1e-10);
    }

    #[test]
    fn test_cva_degenerate_inputs() {
        let c = curve(0.02, 0.4);
        assert_eq!(compute_cva(&[], &[], &c), 0.0);
        assert_eq!(compute_cva(&[100.0, 100.0], &[0.0, 0.5, 1.0], &c), 0.0);
        assert_eq!(compute_cva(&[100.0], &[0.0], &c), 0.0);
    }

    #[test]
    fn test_funding() {
        let (ee, times) = flat();
        assert_relative_eq!(compute_fca(&ee, &times, 0.01), 1.0, epsilon = 1e-12);
        assert_relative_eq!(compute_fba(&ee, &times, 0.005), 0.5, epsilon = 1e-12);
        assert_relative_eq!(compute_mva(&ee, &times, 0.02), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_kva_uses_effective_ee() {
        let times = vec![0.0, 0.5, 1.0];
        let params = KvaParams::default();
        let rising_then_falling = compute_kva(&[100.0, 200.0, 0.0], &times, &params);
        let held = compute_kva(&[100.0, 200.0, 200.0], &times, &params);
        assert_relative_eq!(rising_then_falling, held, epsilon = 1e-12);
        // 0.1 × 0.08 × 1.4 × (75 + 100)
        assert_relative_eq!(held, 0.1 * 0.08 * 1.4 * 175.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cs01_positive() {
        let (ee, times) = flat();
        let cs01 = compute_cva_cs01(&ee, &times, &curve(0.02, 0.4));
        assert!(cs01 > 0.0);
        assert!(cs01 < 0.6 * 100.0 * CS01_BUMP * 1.01);
    }
}
