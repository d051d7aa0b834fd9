//! Check command implementation
//!
//! Loads and validates a run configuration without simulating.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::settings;

/// Run the check command
pub fn run(config_path: &Path) -> Result<()> {
    let config = settings::load(config_path)?;
    let market = config.todays_market()?;
    let grid = config.scenario_generator.date_grid(config.asof)?;

    info!(
        asof = %config.asof,
        base_currency = %config.base_currency,
        dates = grid.valuation_dates().len(),
        close_out_lag_days = ?grid.close_out_lag_days(),
        samples = config.scenario_generator.samples,
        interpretation = ?config.cube_interpretation(),
        analytics = ?config.analytics(),
        "Configuration valid"
    );
    info!(base_currency = %market.base_currency(), "Market built");
    Ok(())
}
