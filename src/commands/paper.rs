//! Paper trading loop

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use regime_trader::events::{self, spawn_log_sink};
use regime_trader::{Orchestrator, PaperConnector};

pub fn run(config_path: String, data_dir: String, balance: f64) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config_path, data_dir, balance))
}

async fn run_async(config_path: String, data_dir: String, balance: f64) -> Result<()> {
    let (config, store) = super::load(&config_path, &data_dir)?;

    info!("╔══════════════════════════════════════════════════╗");
    info!("║ REGIME TRADER (PAPER)                            ║");
    info!("╠══════════════════════════════════════════════════╣");
    info!("║ Symbol: {:<41}║", config.trading.symbol.as_str());
    info!("║ Inverse: {:<40}║", config.trading.inverse_symbol.as_str());
    info!("║ Volatility: {:<37}║", config.trading.volatility_symbol.as_str());
    info!("║ Balance: {:<40.2}║", balance);
    info!("╚══════════════════════════════════════════════════╝");

    let connector = Arc::new(PaperConnector::new(store.clone(), &config.trading, balance));
    let (event_tx, event_rx) = events::channel();
    let sink = spawn_log_sink(event_rx);

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let orchestrator = Orchestrator::new(config, store, connector.clone()).with_events(event_tx);
    orchestrator.run(shutdown_rx, None).await;

    // Orchestrator dropped: the event channel closes and the sink drains
    sink.await.context("Event sink task failed")?;

    let positions = connector.positions().await;
    info!("Shutdown complete. Open paper positions: {:?}", positions);
    Ok(())
}
