//! CLI subcommands

pub mod classify;
pub mod paper;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use regime_trader::market::store::csv_path;
use regime_trader::{Config, HistoricalStore};

/// Load the config and every series the engine reads
fn load(config_path: &str, data_dir: &str) -> Result<(Config, Arc<HistoricalStore>)> {
    let config = Config::from_file(config_path)
        .context(format!("Failed to load config from {}", config_path))?;

    let trading = &config.trading;
    let mut symbols = vec![trading.symbol.clone(), trading.volatility_symbol.clone()];

    // The inverse ETF history is optional; without it no hedge can be priced
    let inverse_path = csv_path(Path::new(data_dir), &trading.inverse_symbol);
    if inverse_path.exists() {
        symbols.push(trading.inverse_symbol.clone());
    }

    // Futures series are read only when both legs are configured
    if let (Some(near), Some(far)) = (&trading.near_term_symbol, &trading.far_term_symbol) {
        symbols.push(near.clone());
        symbols.push(far.clone());
    }

    let store = HistoricalStore::from_dir(data_dir, &symbols)?;
    Ok((config, Arc::new(store)))
}
