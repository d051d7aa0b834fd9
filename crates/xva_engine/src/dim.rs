//! Dynamic initial margin by regression over the netting cube.
//!
//! For each netting set and valuation date (except the last), the close-out
//! P&L of every sample is
//!
//! ```text
//! ΔV = (V_close + flows − V_default) · N(date)
//! ```
//!
//! scaled from the close-out period to the margin horizon by
//! `√(horizon / period)`. With regression order 0 the DIM is the empirical
//! quantile of the scaled ΔV, the same for every sample. With a positive
//! order, ΔV² is regressed on a total-degree polynomial in the standardised
//! regressors and the per-sample DIM is `Φ⁻¹(q) · σ(x) · scaling`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use xva_cube::{AggregationScenarioData, CubeInterpretation, NpvCube, ScenarioDataKey, ValuationCube};

use crate::error::{Result, XvaError};
use crate::math::{
    empirical_quantile, evaluate_basis, mean, norm_inv_cdf, solve_cholesky, std_dev,
    total_degree_monomials,
};

/// Below this many samples DIM estimates are unreliable.
pub const MIN_RECOMMENDED_SAMPLES: usize = 500;

/// Regression settings.
#[derive(Clone, Debug, PartialEq)]
pub struct DimConfig {
    /// Polynomial order; 0 disables regression.
    pub regression_order: usize,
    /// Regressors; empty means the netting set NPV.
    pub regressors: Vec<ScenarioDataKey>,
    /// Number of local regression points; 0 disables the diagnostic.
    pub local_regression_evaluations: usize,
    /// Kernel bandwidth as a multiple of the regressor standard deviation.
    pub local_regression_bandwidth: f64,
    /// Margin quantile in (0, 1).
    pub quantile: f64,
    /// Margin period of risk in calendar days; 0 gives a zero DIM.
    pub horizon_calendar_days: u32,
}

impl Default for DimConfig {
    fn default() -> Self {
        Self {
            regression_order: 0,
            regressors: Vec::new(),
            local_regression_evaluations: 0,
            local_regression_bandwidth: 0.25,
            quantile: 0.99,
            horizon_calendar_days: 14,
        }
    }
}

impl DimConfig {
    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// `XvaError::Configuration` naming every invalid setting.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if !(self.quantile > 0.0 && self.quantile < 1.0) {
            errors.push(format!("DIM quantile {} must lie in (0, 1)", self.quantile));
        }
        if self.local_regression_evaluations > 0 && self.local_regression_bandwidth <= 0.0 {
            errors.push("local regression bandwidth must be positive".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(XvaError::configuration(errors.join("; ")))
        }
    }
}

/// One point of the local regression diagnostic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalRegressionPoint {
    /// Regressor value.
    pub regressor: f64,
    /// DIM implied by the polynomial regression.
    pub regression_dim: f64,
    /// DIM implied by the Nadaraya-Watson estimate.
    pub local_dim: f64,
}

/// Local regression diagnostic of one netting set and date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalRegressionDiagnostic {
    /// Netting set id.
    pub netting_set_id: String,
    /// Valuation date index.
    pub date: usize,
    /// Evaluation points, in increasing regressor order.
    pub points: Vec<LocalRegressionPoint>,
}

/// DIM per netting set, date and sample.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DimResults {
    netting_ids: Vec<String>,
    dates: Vec<chrono::NaiveDate>,
    samples: usize,
    expected: Vec<Vec<f64>>,
    per_sample: Vec<Vec<Vec<f64>>>,
    diagnostics: Vec<LocalRegressionDiagnostic>,
}

impl DimResults {
    /// Netting set ids, in netting cube order.
    #[inline]
    pub fn netting_ids(&self) -> &[String] {
        &self.netting_ids
    }

    /// Valuation dates.
    #[inline]
    pub fn dates(&self) -> &[chrono::NaiveDate] {
        &self.dates
    }

    /// Number of samples.
    #[inline]
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Index of a netting set.
    pub fn index_of(&self, netting_id: &str) -> Option<usize> {
        self.netting_ids.iter().position(|id| id == netting_id)
    }

    /// Expected DIM profile of a netting set.
    pub fn expected(&self, netting_set: usize) -> Option<&[f64]> {
        self.expected.get(netting_set).map(Vec::as_slice)
    }

    /// DIM of every sample of a netting set at one date.
    pub fn sample_dims(&self, netting_set: usize, date: usize) -> Option<&[f64]> {
        self.per_sample
            .get(netting_set)
            .and_then(|d| d.get(date))
            .map(Vec::as_slice)
    }

    /// DIM of one netting set, date and sample.
    pub fn dim(&self, netting_set: usize, date: usize, sample: usize) -> Option<f64> {
        self.sample_dims(netting_set, date)
            .and_then(|s| s.get(sample))
            .copied()
    }

    /// Local regression diagnostics.
    #[inline]
    pub fn diagnostics(&self) -> &[LocalRegressionDiagnostic] {
        &self.diagnostics
    }
}

struct NettingSetDim {
    expected: Vec<f64>,
    per_sample: Vec<Vec<f64>>,
    diagnostics: Vec<LocalRegressionDiagnostic>,
}

/// Regression fit of ΔV² on standardised regressors.
struct VarianceFit {
    basis: Vec<Vec<u32>>,
    coefficients: Option<Vec<f64>>,
    fallback: f64,
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl VarianceFit {
    fn standardise(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(v, (m, s))| if *s > 0.0 { (v - m) / s } else { 0.0 })
            .collect()
    }

    fn variance(&self, x: &[f64]) -> f64 {
        match &self.coefficients {
            Some(beta) => {
                let z = self.standardise(x);
                evaluate_basis(&self.basis, &z)
                    .iter()
                    .zip(beta)
                    .map(|(b, c)| b * c)
                    .sum::<f64>()
                    .max(0.0)
            }
            None => self.fallback.max(0.0),
        }
    }
}

/// DIM calculator over a netting cube.
#[derive(Clone, Debug, Default)]
pub struct DimCalculator {
    config: DimConfig,
}

impl DimCalculator {
    /// Creates a calculator.
    pub fn new(config: DimConfig) -> Self {
        Self { config }
    }

    /// Settings.
    #[inline]
    pub fn config(&self) -> &DimConfig {
        &self.config
    }

    /// Computes DIM for every netting set of `netting`.
    ///
    /// # Errors
    ///
    /// - `XvaError::Configuration` for invalid settings or a regressor missing
    ///   from the scenario data
    /// - `XvaError::DimensionMismatch` if the scenario data does not cover the
    ///   netting cube
    pub fn compute(
        &self,
        netting: &ValuationCube,
        interpretation: &CubeInterpretation,
        scenario_data: &AggregationScenarioData,
    ) -> Result<DimResults> {
        self.config.validate()?;
        if scenario_data.dates() != netting.dates() || scenario_data.samples() != netting.samples() {
            return Err(XvaError::dimension_mismatch(
                "scenario data does not match the netting cube".to_string(),
            ));
        }
        let numeraire = ScenarioDataKey::numeraire();
        if !scenario_data.has(&numeraire) {
            return Err(XvaError::configuration("scenario data has no numeraire"));
        }
        if let Some(missing) = self.config.regressors.iter().find(|k| !scenario_data.has(k)) {
            return Err(XvaError::configuration(format!(
                "DIM regressor {} is not in the scenario data",
                missing
            )));
        }

        let samples = netting.samples();
        if samples < MIN_RECOMMENDED_SAMPLES {
            warn!(
                samples,
                minimum = MIN_RECOMMENDED_SAMPLES,
                "DIM estimated from few samples"
            );
        }
        info!(
            netting_sets = netting.num_ids(),
            order = self.config.regression_order,
            quantile = self.config.quantile,
            "Computing DIM"
        );

        let per_set: Vec<NettingSetDim> = (0..netting.num_ids())
            .into_par_iter()
            .map(|ns| self.netting_set_dim(netting, interpretation, scenario_data, ns))
            .collect::<Result<_>>()?;

        let mut results = DimResults {
            netting_ids: netting.ids().to_vec(),
            dates: netting.dates().to_vec(),
            samples,
            ..DimResults::default()
        };
        for set in per_set {
            results.expected.push(set.expected);
            results.per_sample.push(set.per_sample);
            results.diagnostics.extend(set.diagnostics);
        }
        Ok(results)
    }

    fn netting_set_dim(
        &self,
        netting: &ValuationCube,
        interpretation: &CubeInterpretation,
        scenario_data: &AggregationScenarioData,
        ns: usize,
    ) -> Result<NettingSetDim> {
        let samples = netting.samples();
        let dates = netting.dates();
        let n_dates = dates.len();
        let numeraire_key = ScenarioDataKey::numeraire();
        let mut out = NettingSetDim {
            expected: vec![0.0; n_dates],
            per_sample: vec![vec![0.0; samples]; n_dates],
            diagnostics: Vec::new(),
        };

        for date in 0..n_dates.saturating_sub(1) {
            let period = interpretation.close_out_horizon_days(dates, date);
            if period <= 0 {
                continue;
            }
            let scaling = (f64::from(self.config.horizon_calendar_days) / period as f64).sqrt();
            let numeraire = scenario_data.values_at(date, &numeraire_key)?;

            let mut delta = Vec::with_capacity(samples);
            let mut npv = Vec::with_capacity(samples);
            for (sample, n) in numeraire.iter().enumerate() {
                let default = interpretation.default_date_npv(netting, ns, date, sample)?;
                let close = interpretation.close_out_npv(netting, ns, date, sample)?;
                let flows = interpretation.flows(netting, ns, date, sample)?;
                delta.push((close + flows - default) * n);
                npv.push(default * n);
            }

            let dims = &mut out.per_sample[date];
            if self.config.regression_order == 0 {
                let scaled: Vec<f64> = delta.iter().map(|d| d * scaling).collect();
                let dim = empirical_quantile(&scaled, self.config.quantile).max(0.0);
                dims.iter_mut().for_each(|v| *v = dim);
            } else {
                let regressors = self.regressors(scenario_data, date, &npv)?;
                let y: Vec<f64> = delta.iter().map(|d| d * d).collect();
                let fit = self.fit(&regressors, &y, &netting.ids()[ns], date);
                let z = norm_inv_cdf(self.config.quantile);
                for (sample, dim) in dims.iter_mut().enumerate() {
                    let x: Vec<f64> = regressors.iter().map(|r| r[sample]).collect();
                    *dim = (z * fit.variance(&x).sqrt() * scaling).max(0.0);
                }
                if self.config.local_regression_evaluations > 0 {
                    if let Some(diag) = self.local_regression(&regressors, &y, &fit, scaling, z) {
                        out.diagnostics.push(LocalRegressionDiagnostic {
                            netting_set_id: netting.ids()[ns].clone(),
                            date,
                            points: diag,
                        });
                    }
                }
            }
            out.expected[date] = mean(dims);
        }
        debug!(netting_set = %netting.ids()[ns], "DIM profile done");
        Ok(out)
    }

    /// Regressor values per variable, each of length `samples`.
    fn regressors(
        &self,
        scenario_data: &AggregationScenarioData,
        date: usize,
        npv: &[f64],
    ) -> Result<Vec<Vec<f64>>> {
        if self.config.regressors.is_empty() {
            return Ok(vec![npv.to_vec()]);
        }
        self.config
            .regressors
            .iter()
            .map(|key| scenario_data.values_at(date, key).map_err(XvaError::from))
            .collect()
    }

    fn fit(&self, regressors: &[Vec<f64>], y: &[f64], netting_id: &str, date: usize) -> VarianceFit {
        let means: Vec<f64> = regressors.iter().map(|r| mean(r)).collect();
        let stds: Vec<f64> = regressors.iter().map(|r| std_dev(r)).collect();
        let basis = total_degree_monomials(regressors.len(), self.config.regression_order);
        let mut fit = VarianceFit {
            basis,
            coefficients: None,
            fallback: mean(y),
            means,
            stds,
        };

        let k = fit.basis.len();
        let mut xtx = vec![vec![0.0; k]; k];
        let mut xty = vec![0.0; k];
        for (sample, &target) in y.iter().enumerate() {
            let x: Vec<f64> = regressors.iter().map(|r| r[sample]).collect();
            let row = evaluate_basis(&fit.basis, &fit.standardise(&x));
            for i in 0..k {
                xty[i] += row[i] * target;
                for j in 0..=i {
                    xtx[i][j] += row[i] * row[j];
                }
            }
        }
        for i in 0..k {
            for j in 0..i {
                xtx[j][i] = xtx[i][j];
            }
        }

        fit.coefficients = solve_cholesky(&xtx, &xty).or_else(|| {
            let trace: f64 = (0..k).map(|i| xtx[i][i]).sum();
            let ridge = 1e-8 * (trace / k as f64).max(1.0);
            let mut regularised = xtx.clone();
            for (i, row) in regularised.iter_mut().enumerate() {
                row[i] += ridge;
            }
            solve_cholesky(&regularised, &xty)
        });
        if fit.coefficients.is_none() {
            warn!(netting_set = netting_id, date, "DIM regression singular, using mean variance");
        }
        fit
    }

    fn local_regression(
        &self,
        regressors: &[Vec<f64>],
        y: &[f64],
        fit: &VarianceFit,
        scaling: f64,
        z: f64,
    ) -> Option<Vec<LocalRegressionPoint>> {
        if regressors.len() != 1 {
            warn!(
                regressors = regressors.len(),
                "local regression needs a single regressor, skipped"
            );
            return None;
        }
        let x = &regressors[0];
        let h = self.config.local_regression_bandwidth * std_dev(x);
        if h <= 0.0 {
            return None;
        }
        let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let n = self.config.local_regression_evaluations;

        let points = (0..n)
            .map(|i| {
                let at = if n == 1 {
                    0.5 * (lo + hi)
                } else {
                    lo + (hi - lo) * i as f64 / (n - 1) as f64
                };
                let (num, den) = x.iter().zip(y).fold((0.0, 0.0), |(num, den), (xi, yi)| {
                    let u = (at - xi) / h;
                    let w = (-0.5 * u * u).exp();
                    (num + w * yi, den + w)
                });
                let local = if den > 0.0 { num / den } else { 0.0 };
                LocalRegressionPoint {
                    regressor: at,
                    regression_dim: (z * fit.variance(&[at]).sqrt() * scaling).max(0.0),
                    local_dim: (z * local.max(0.0).sqrt() * scaling).max(0.0),
                }
            })
            .collect();
        Some(points)
    }
}
