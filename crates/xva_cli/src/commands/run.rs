//! Run command implementation
//!
//! Runs every stage of the XVA simulation and writes the report as JSON.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use xva_engine::portfolio::TradeId;
use xva_engine::runner::XvaRunner;

use crate::{portfolio, settings};

/// Run the run command
pub fn run(
    config_path: &Path,
    portfolio_path: Option<&Path>,
    trades: &[String],
    continue_on_error: bool,
    output: Option<&Path>,
) -> Result<()> {
    let config = settings::load(config_path)?;
    let market = config.todays_market()?;

    let portfolio = match portfolio_path {
        Some(path) => portfolio::load(path)?,
        None => {
            let foreign = config
                .model
                .currencies()
                .into_iter()
                .find(|c| *c != config.base_currency);
            info!("No portfolio given, using the demo portfolio");
            portfolio::demo(config.asof, config.base_currency, foreign)?
        }
    };
    info!(trades = portfolio.len(), "Portfolio loaded");

    let mut runner = XvaRunner::new(config, Arc::new(portfolio));
    runner.prepare(&market, continue_on_error, None)?;
    if trades.is_empty() {
        runner.build_cube(None, continue_on_error)?;
    } else {
        let ids: Vec<TradeId> = trades.iter().map(|t| TradeId::new(t.as_str())).collect();
        runner.build_cube(Some(&ids), continue_on_error)?;
    }

    let npv_cube = Arc::clone(runner.npv_cube()?);
    let netting_cube = Arc::clone(runner.netting_cube()?);
    let scenario_data = Arc::clone(runner.aggregation_scenario_data()?);
    runner.generate_post_processor(&market, npv_cube, netting_cube, scenario_data, continue_on_error)?;

    for failure in runner.trade_failures()? {
        warn!(trade_id = %failure.trade_id, cause = %failure.cause, "Trade skipped");
    }
    let path_failures = runner.path_failures()?.len();
    if path_failures > 0 {
        warn!(count = path_failures, "Pricing failures left cells at the fill value");
    }

    let report = runner.report()?;
    for ns in &report.netting_sets {
        info!(
            netting_set = %ns.netting_set_id,
            counterparty = %ns.counterparty_id,
            epe = ns.exposure.epe,
            cva = ?ns.cva,
            dva = ?ns.dva,
            fva = ?ns.fva(),
            mva = ?ns.mva,
            kva = ?ns.kva,
            "Netting set"
        );
    }

    let json = report.to_json()?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{}", json),
    }
    Ok(())
}
