//! One-shot regime classification report

use anyhow::{Context, Result};
use chrono::Utc;

use regime_trader::market::{MarketConnector, MarketDataStore};
use regime_trader::regime::completed_bars;
use regime_trader::risk::kill_status;
use regime_trader::{PaperConnector, RegimeClassifier, VolatilityCache};

pub fn run(config_path: String, data_dir: String) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config_path, data_dir))
}

async fn run_async(config_path: String, data_dir: String) -> Result<()> {
    let (config, store) = super::load(&config_path, &data_dir)?;
    let trading = &config.trading;

    let connector = PaperConnector::new(store.clone(), trading, 0.0);
    let snapshot = connector.snapshot().await?;
    let vol = snapshot.volatility;

    let status = kill_status(&config.risk, vol.near_term, vol.far_term);

    let mut cache = VolatilityCache::new(
        store.clone(),
        trading.volatility_symbol.clone(),
        config.volatility.clone(),
    );
    let today = config.session.local_time(Utc::now()).date_naive();
    cache.refresh_baseline_if_stale(today).await?;
    let z_score = cache.hybrid_z_score(vol.spot).await?;

    let bars = completed_bars(
        store.daily_bars(&trading.symbol, trading.history_days).await?,
        today,
    );

    let classifier = RegimeClassifier::new(config.regime.clone());
    let (efficiency, strength) = classifier.assess(&bars);
    let regime = if status.is_clear() {
        classifier.classify(z_score, efficiency, strength, vol.is_backwardation())
    } else {
        regime_trader::Regime::Crisis
    };

    println!("\n{}", "=".repeat(50));
    println!("REGIME REPORT: {}", trading.symbol);
    println!("{}", "=".repeat(50));
    println!("Price:               {:>12.2}", snapshot.price);
    println!("Volatility (spot):   {:>12.2}", vol.spot);
    println!("Near / far term:     {:>6.2} / {:<6.2}", vol.near_term, vol.far_term);
    println!("Kill switch:         {:>12}", status.to_string());
    if let Some(baseline) = cache.baseline() {
        println!("Baseline mean / std: {:>6.2} / {:<6.2}", baseline.mean, baseline.std_dev);
    }
    println!("Z-score:             {:>12.2}", z_score);
    println!("Efficiency ratio:    {:>12.3}", efficiency);
    println!("ADX:                 {:>12.2}", strength);
    println!("Regime:              {:>12}", regime.to_string());
    println!(
        "Next interval:       {:>9} ms",
        cache.recommended_interval_ms(z_score)
    );
    println!("{}", "=".repeat(50));

    Ok(())
}
