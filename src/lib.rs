//! Regime Trader
//!
//! Control core of a single-instrument trading system that switches
//! between three strategies depending on the market regime.
//!
//! Every tick the [`Orchestrator`](orchestrator::Orchestrator):
//! 1. asks the [`RiskGate`](risk::RiskGate) for the kill-switch status,
//! 2. short-circuits to crisis handling when it is not clear,
//! 3. otherwise computes the hybrid volatility Z-score and the regime,
//! 4. retimes itself (1 s near a regime boundary, 5 s otherwise),
//! 5. hands the tick to the regime's strategy,
//! 6. forwards the resulting signals to the broker connector.
//!
//! ## Example (one-shot classification)
//! ```no_run
//! use regime_trader::{Config, HistoricalStore, Orchestrator, PaperConnector};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let symbols = [
//!         config.trading.symbol.clone(),
//!         config.trading.volatility_symbol.clone(),
//!     ];
//!     let store = Arc::new(HistoricalStore::from_dir("data", &symbols)?);
//!     let paper = Arc::new(PaperConnector::new(store.clone(), &config.trading, 100_000.0));
//!     let mut engine = Orchestrator::new(config, store, paper);
//!     let report = engine.tick().await?;
//!     println!("{} ({:?})", report.regime, report.z_score);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod indicators;
pub mod market;
pub mod orchestrator;
pub mod regime;
pub mod risk;
pub mod strategies;
pub mod types;
pub mod volatility;

pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use events::EngineEvent;
pub use market::{HistoricalStore, MarketConnector, MarketDataStore, PaperConnector};
pub use orchestrator::{Orchestrator, ScheduleState, TickReport};
pub use regime::RegimeClassifier;
pub use risk::RiskGate;
pub use strategies::{BlackStrategy, GreenStrategy, RedStrategy, RegimeStrategy};
pub use types::*;
pub use volatility::VolatilityCache;
