//! Scenario generation.
//!
//! A [`ScenarioGenerator`] hands out one lazy [`ScenarioPath`] per Monte Carlo
//! sample. Each path owns its random stream, seeded from `(seed, sample)`, so
//! paths can be simulated on any thread in any order with identical results.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use xva_models::builder::CrossAssetModelBuilder;
//! use xva_models::grid::DateGrid;
//! use xva_models::market::TodaysMarket;
//! use xva_models::model::{CrossAssetModelData, IrModelData};
//! use xva_models::scenario::ScenarioGenerator;
//! use xva_models::types::{Currency, DayCount};
//!
//! let asof = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
//! let market = TodaysMarket::new(asof, Currency::USD, DayCount::Act365F)
//!     .with_zero_rate(Currency::USD, 0.04);
//! let data = CrossAssetModelData {
//!     ir: vec![IrModelData {
//!         currency: Currency::USD,
//!         mean_reversion: 0.03,
//!         sigma: 0.01,
//!         calibration: None,
//!     }],
//!     ..Default::default()
//! };
//! let model = CrossAssetModelBuilder::new(&market, &data).build(true).unwrap().model;
//! let grid = DateGrid::new(asof, vec![NaiveDate::from_ymd_opt(2024, 7, 2).unwrap()], None).unwrap();
//!
//! let generator = ScenarioGenerator::new(model, Arc::new(grid), 100, 42);
//! let scenarios: Vec<_> = generator.path(0).collect();
//! assert_eq!(scenarios.len(), 1);
//! assert!(scenarios[0].numeraire() > 0.0);
//! ```

use std::sync::Arc;

use chrono::NaiveDate;

use crate::grid::{DateGrid, GridPoint, GridPointKind};
use crate::model::CrossAssetModel;
use crate::rng::PathRng;
use crate::types::Currency;

/// Realisation of every risk factor on one path step.
#[derive(Clone, Debug, PartialEq)]
pub struct Scenario {
    point: GridPoint,
    sample: usize,
    time: f64,
    ir_states: Vec<f64>,
    short_rates: Vec<f64>,
    fx_spots: Vec<f64>,
    numeraire: f64,
}

impl Scenario {
    /// Scenario of today's market (all states at their initial values).
    pub fn today(model: &CrossAssetModel) -> Self {
        Self {
            point: GridPoint {
                date: model.asof(),
                kind: GridPointKind::Valuation,
                valuation_index: 0,
            },
            sample: 0,
            time: 0.0,
            ir_states: vec![0.0; model.ir_factors().len()],
            short_rates: model
                .ir_factors()
                .iter()
                .map(|f| f.short_rate(0.0, 0.0))
                .collect(),
            fx_spots: model.fx_factors().iter().map(|f| f.spot()).collect(),
            numeraire: 1.0,
        }
    }

    /// Date of the step.
    #[inline]
    pub fn date(&self) -> NaiveDate {
        self.point.date
    }

    /// Grid point of the step.
    #[inline]
    pub fn point(&self) -> &GridPoint {
        &self.point
    }

    /// Sample index.
    #[inline]
    pub fn sample(&self) -> usize {
        self.sample
    }

    /// Model time of the step.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Hull-White states, in model rate factor order.
    #[inline]
    pub fn ir_states(&self) -> &[f64] {
        &self.ir_states
    }

    /// Short rates, in model rate factor order.
    #[inline]
    pub fn short_rates(&self) -> &[f64] {
        &self.short_rates
    }

    /// FX spots (domestic per foreign), in model FX factor order.
    #[inline]
    pub fn fx_spots(&self) -> &[f64] {
        &self.fx_spots
    }

    /// Bank account numeraire in domestic currency.
    #[inline]
    pub fn numeraire(&self) -> f64 {
        self.numeraire
    }
}

/// Produces per-sample scenario paths over a date grid.
#[derive(Clone, Debug)]
pub struct ScenarioGenerator {
    model: Arc<CrossAssetModel>,
    grid: Arc<DateGrid>,
    samples: usize,
    seed: u64,
}

impl ScenarioGenerator {
    /// Creates a generator.
    pub fn new(model: Arc<CrossAssetModel>, grid: Arc<DateGrid>, samples: usize, seed: u64) -> Self {
        Self {
            model,
            grid,
            samples,
            seed,
        }
    }

    /// Model the paths are simulated under.
    #[inline]
    pub fn model(&self) -> &Arc<CrossAssetModel> {
        &self.model
    }

    /// Date grid.
    #[inline]
    pub fn grid(&self) -> &Arc<DateGrid> {
        &self.grid
    }

    /// Number of samples.
    #[inline]
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Run seed.
    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Lazy path of one sample, yielding a scenario per grid point in date
    /// order.
    pub fn path(&self, sample: usize) -> ScenarioPath {
        let model = Arc::clone(&self.model);
        let fx_ir_index = model
            .fx_factors()
            .iter()
            .map(|f| model.ir_index(f.currency()).unwrap_or(0))
            .collect();
        let today = Scenario::today(&model);
        ScenarioPath {
            rng: PathRng::for_sample(self.seed, sample),
            grid: Arc::clone(&self.grid),
            next: 0,
            sample,
            time: 0.0,
            x: today.ir_states,
            rates: today.short_rates,
            ln_fx: today.fx_spots.iter().map(|s| s.ln()).collect(),
            ln_numeraire: 0.0,
            fx_ir_index,
            z: vec![0.0; model.num_factors()],
            model,
        }
    }
}

/// Iterator over the scenarios of one sample.
#[derive(Debug)]
pub struct ScenarioPath {
    model: Arc<CrossAssetModel>,
    grid: Arc<DateGrid>,
    rng: PathRng,
    next: usize,
    sample: usize,
    time: f64,
    x: Vec<f64>,
    rates: Vec<f64>,
    ln_fx: Vec<f64>,
    ln_numeraire: f64,
    fx_ir_index: Vec<usize>,
    z: Vec<f64>,
}

impl ScenarioPath {
    /// Sample index of the path.
    #[inline]
    pub fn sample(&self) -> usize {
        self.sample
    }

    fn step(&mut self, t: f64) {
        let dt = (t - self.time).max(0.0);
        let sqrt_dt = dt.sqrt();
        self.rng.fill_normal(&mut self.z);
        self.model.cholesky().transform_inplace(&mut self.z);

        let n_ir = self.x.len();
        let domestic_rate = self.rates[0];
        for (j, fx) in self.model.fx_factors().iter().enumerate() {
            let foreign_rate = self.rates[self.fx_ir_index[j]];
            let s = fx.sigma();
            self.ln_fx[j] += (domestic_rate - foreign_rate - 0.5 * s * s) * dt + s * sqrt_dt * self.z[n_ir + j];
        }

        for (i, hw) in self.model.ir_factors().iter().enumerate() {
            let (decay, std) = hw.transition(dt);
            self.x[i] = self.x[i] * decay + std * self.z[i];
            self.rates[i] = hw.short_rate(t, self.x[i]);
        }

        // trapezoid on the domestic short rate
        self.ln_numeraire += 0.5 * (domestic_rate + self.rates[0]) * dt;
        self.time = t;
    }
}

impl Iterator for ScenarioPath {
    type Item = Scenario;

    fn next(&mut self) -> Option<Scenario> {
        let point = *self.grid.points().get(self.next)?;
        self.next += 1;
        let t = self.model.time(point.date);
        self.step(t);
        Some(Scenario {
            point,
            sample: self.sample,
            time: t,
            ir_states: self.x.clone(),
            short_rates: self.rates.clone(),
            fx_spots: self.ln_fx.iter().map(|l| l.exp()).collect(),
            numeraire: self.ln_numeraire.exp(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.points().len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ScenarioPath {}

/// Currency of each FX spot in a scenario, in model order.
pub fn fx_currencies(model: &CrossAssetModel) -> Vec<Currency> {
    model.fx_factors().iter().map(|f| f.currency()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CrossAssetModelBuilder;
    use crate::market::TodaysMarket;
    use crate::model::{CrossAssetModelData, FxModelData, IrModelData};
    use crate::types::DayCount;
    use approx::assert_relative_eq;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn generator(samples: usize, lag: Option<i64>) -> ScenarioGenerator {
        let asof = d(2024, 1, 2);
        let market = TodaysMarket::new(asof, Currency::USD, DayCount::Act365F)
            .with_zero_rate(Currency::USD, 0.04)
            .with_zero_rate(Currency::EUR, 0.02)
            .with_fx_spot(Currency::EUR, 1.1);
        let data = CrossAssetModelData {
            ir: vec![
                IrModelData {
                    currency: Currency::USD,
                    mean_reversion: 0.03,
                    sigma: 0.01,
                    calibration: None,
                },
                IrModelData {
                    currency: Currency::EUR,
                    mean_reversion: 0.03,
                    sigma: 0.008,
                    calibration: None,
                },
            ],
            fx: vec![FxModelData {
                currency: Currency::EUR,
                sigma: 0.1,
            }],
            correlations: vec![],
        };
        let model = CrossAssetModelBuilder::new(&market, &data)
            .build(false)
            .unwrap()
            .model;
        let grid = DateGrid::new(
            asof,
            vec![d(2024, 4, 2), d(2024, 7, 2), d(2025, 1, 2)],
            lag,
        )
        .unwrap();
        ScenarioGenerator::new(model, Arc::new(grid), samples, 42)
    }

    #[test]
    fn test_path_visits_grid_in_order() {
        let gen = generator(10, Some(10));
        let path = gen.path(3);
        assert_eq!(path.len(), 6);
        let dates: Vec<NaiveDate> = path.map(|s| s.date()).collect();
        assert!(dates.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_paths_are_reproducible_per_sample() {
        let gen = generator(10, None);
        let a: Vec<Scenario> = gen.path(5).collect();
        let b: Vec<Scenario> = gen.path(5).collect();
        let c: Vec<Scenario> = gen.path(6).collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|s| s.sample() == 5));
    }

    #[test]
    fn test_today_scenario() {
        let gen = generator(1, None);
        let today = Scenario::today(gen.model());
        assert_eq!(today.numeraire(), 1.0);
        assert_relative_eq!(today.fx_spots()[0], 1.1);
        assert_relative_eq!(today.short_rates()[0], 0.04);
    }

    #[test]
    fn test_discounted_numeraire_is_martingale() {
        // E[1 / N(T)] = P(0, T) under the bank account measure
        let gen = generator(4000, None);
        let last = gen.grid().valuation_dates().len() - 1;
        let t = gen.model().time(gen.grid().valuation_dates()[last]);
        let mean: f64 = (0..gen.samples())
            .map(|s| 1.0 / gen.path(s).last().unwrap().numeraire())
            .sum::<f64>()
            / gen.samples() as f64;
        assert_relative_eq!(mean, (-0.04 * t).exp(), max_relative = 5e-3);
    }

    #[test]
    fn test_fx_forward_is_martingale() {
        // E[S(T) / N(T)] = S(0) P_f(0, T)
        let gen = generator(4000, None);
        let t = gen.model().time(d(2025, 1, 2));
        let mean: f64 = (0..gen.samples())
            .map(|s| {
                let sc = gen.path(s).last().unwrap();
                sc.fx_spots()[0] / sc.numeraire()
            })
            .sum::<f64>()
            / gen.samples() as f64;
        assert_relative_eq!(mean, 1.1 * (-0.02 * t).exp(), max_relative = 1e-2);
    }

    #[test]
    fn test_fx_currencies() {
        let gen = generator(1, None);
        assert_eq!(fx_currencies(gen.model()), vec![Currency::EUR]);
    }
}
