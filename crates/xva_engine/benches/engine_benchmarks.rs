//! Criterion benchmarks for the valuation engine, DIM and exposures.
//!
//! Benchmarks cover:
//! - Cube builds, sequential and parallel over samples
//! - DIM regression of order 0 and 2
//! - Expected exposure profiles

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use xva_cube::{AggregationScenarioData, CubeInterpretation, NpvCube, ScenarioDataKey, ValuationCube};
use xva_engine::calculators::calculators_for_layout;
use xva_engine::dim::{DimCalculator, DimConfig};
use xva_engine::engine::{BuiltTrade, ValuationEngine};
use xva_engine::engine_data::{EngineData, ReferenceData};
use xva_engine::instruments::{BuildContext, Instrument, InterestRateSwap};
use xva_engine::parallel::ParallelConfig;
use xva_engine::portfolio::TradeId;
use xva_engine::xva::ExposureCalculator;
use xva_models::model::IrModelData;
use xva_models::{
    CrossAssetModelBuilder, CrossAssetModelData, Currency, DateGrid, DayCount, ScenarioGenerator,
    ScenarioSimMarket, SimMarketParameters, TodaysMarket,
};

fn asof() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
}

fn engine(samples: usize, n_dates: usize, parallel: ParallelConfig) -> ValuationEngine {
    let market = TodaysMarket::new(asof(), Currency::USD, DayCount::Act365F)
        .with_zero_rate(Currency::USD, 0.03);
    let data = CrossAssetModelData {
        ir: vec![IrModelData {
            currency: Currency::USD,
            mean_reversion: 0.03,
            sigma: 0.01,
            calibration: None,
        }],
        fx: vec![],
        correlations: vec![],
    };
    let model = CrossAssetModelBuilder::new(&market, &data).build(false).unwrap().model;
    let dates = (1..=n_dates as i64)
        .map(|i| asof() + Duration::days(91 * i))
        .collect();
    let grid = Arc::new(DateGrid::new(asof(), dates, None).unwrap());
    let generator = ScenarioGenerator::new(Arc::clone(&model), grid, samples, 42);
    let sim = ScenarioSimMarket::new(model, &SimMarketParameters::default()).unwrap();
    ValuationEngine::new(generator, sim, false).with_parallel(parallel)
}

fn swaps(engine: &ValuationEngine, n: usize) -> Vec<BuiltTrade> {
    let engine_data = EngineData::default().with_engine("InterestRateSwap", "DiscountedCashflows");
    let reference_data = ReferenceData::default();
    let sim = ScenarioSimMarket::new(
        Arc::clone(engine.generator().model()),
        &SimMarketParameters::default(),
    )
    .unwrap();
    let ctx = BuildContext {
        engine_data: &engine_data,
        reference_data: &reference_data,
        market: &sim,
    };
    (0..n)
        .map(|i| {
            let maturity = asof() + Duration::days(365 * (1 + (i % 10) as i64));
            let swap = InterestRateSwap::new(Currency::USD, 1e6, 0.025 + 0.001 * i as f64, asof(), maturity);
            BuiltTrade {
                id: TradeId::new(format!("T{}", i)),
                instrument: swap.build(&ctx).unwrap(),
            }
        })
        .collect()
}

fn bench_build_cube(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_cube");
    group.sample_size(10);

    let interpretation = CubeInterpretation::Regular { store_flows: false };
    let layout = interpretation.layout();
    let calculators = calculators_for_layout(&layout);

    for (label, parallel) in [
        ("sequential", ParallelConfig::sequential()),
        ("parallel", ParallelConfig::default()),
    ] {
        let engine = engine(500, 20, parallel);
        let trades = swaps(&engine, 20);
        let dates = engine.generator().grid().valuation_dates().to_vec();
        let ids: Vec<String> = trades.iter().map(|t| t.id.to_string()).collect();

        group.bench_function(BenchmarkId::new(label, "20trades_20dates_500samples"), |b| {
            b.iter(|| {
                let mut cube =
                    ValuationCube::allocate(asof(), ids.clone(), dates.clone(), 500, layout.depth(), 0.0)
                        .unwrap();
                let mut data =
                    AggregationScenarioData::new(dates.clone(), 500, engine.scenario_data_keys());
                engine
                    .build_cube(&trades, &calculators, &mut cube, None, &mut data, false)
                    .unwrap();
                black_box(cube.get(0, 0, 0, 0).unwrap())
            });
        });
    }

    group.finish();
}

fn synthetic_netting(samples: usize, n_dates: usize) -> (ValuationCube, AggregationScenarioData) {
    let dates: Vec<NaiveDate> = (1..=n_dates as i64)
        .map(|i| asof() + Duration::days(91 * i))
        .collect();
    let mut cube = ValuationCube::allocate(
        asof(),
        vec!["NS".to_string()],
        dates.clone(),
        samples,
        2,
        0.0,
    )
    .unwrap();
    let numeraire = ScenarioDataKey::numeraire();
    let fx = ScenarioDataKey::fx_spot("EUR");
    let mut data = AggregationScenarioData::new(dates, samples, vec![numeraire.clone(), fx.clone()]);
    for date in 0..n_dates {
        for s in 0..samples {
            let x = ((s * 7919 + date * 104_729) % 1000) as f64 / 1000.0 - 0.5;
            cube.set(0, date, s, 0, 1000.0 * x).unwrap();
            cube.set(0, date, s, 1, 1000.0 * x * (1.0 + 0.1 * x)).unwrap();
            data.set(date, s, &numeraire, 1.0).unwrap();
            data.set(date, s, &fx, 1.1 + 0.1 * x).unwrap();
        }
    }
    (cube, data)
}

fn bench_dim(c: &mut Criterion) {
    let mut group = c.benchmark_group("dim_regression");
    let interpretation = CubeInterpretation::MporGrid { close_out_lag_days: 14 };
    let (cube, data) = synthetic_netting(2000, 20);

    for order in [0usize, 2] {
        let config = DimConfig {
            regression_order: order,
            regressors: vec![ScenarioDataKey::fx_spot("EUR")],
            ..DimConfig::default()
        };
        let calculator = DimCalculator::new(config);
        group.bench_with_input(BenchmarkId::new("order", order), &calculator, |b, calc| {
            b.iter(|| calc.compute(black_box(&cube), &interpretation, &data).unwrap());
        });
    }

    group.finish();
}

fn bench_expected_exposure(c: &mut Criterion) {
    let mut group = c.benchmark_group("expected_exposure");

    for (n_scenarios, n_times) in [(1000, 50), (10000, 50)] {
        let values: Vec<Vec<f64>> = (0..n_scenarios)
            .map(|s| {
                (0..n_times)
                    .map(|t| (((s * 17 + t * 13) % 100) as f64 - 50.0) * 0.3)
                    .collect()
            })
            .collect();
        let label = format!("{}scenarios_{}times", n_scenarios, n_times);
        group.bench_with_input(BenchmarkId::new("ee", &label), &values, |b, values| {
            b.iter(|| ExposureCalculator::expected_exposure(black_box(values)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_cube, bench_dim, bench_expected_exposure);
criterion_main!(benches);
