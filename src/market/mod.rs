//! Market collaborators
//!
//! The engine only reads history from a [`MarketDataStore`] and talks to
//! the broker through a [`MarketConnector`]. Both are object-safe async
//! traits so the orchestrator can hold them as `Arc<dyn ...>`.

pub mod paper;
pub mod store;

use async_trait::async_trait;
use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::indicators;
use crate::{Candle, Symbol, TradeSignal};

pub use paper::PaperConnector;
pub use store::HistoricalStore;

/// Sample mean and standard deviation of a volatility index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityStats {
    pub mean: f64,
    pub std: f64,
}

/// Read-only access to daily history
#[async_trait]
pub trait MarketDataStore: Send + Sync {
    /// Trailing `days` daily bars, oldest first
    async fn daily_bars(&self, symbol: &Symbol, days: usize) -> EngineResult<Vec<Candle>>;

    /// Mean and sample standard deviation of the trailing `days` closes
    async fn volatility_stats(&self, symbol: &Symbol, days: usize) -> EngineResult<VolatilityStats> {
        let closes: Vec<f64> = self
            .daily_bars(symbol, days)
            .await?
            .iter()
            .map(|c| c.close)
            .collect();

        indicators::mean_std(&closes)
            .map(|(mean, std)| VolatilityStats { mean, std })
            .ok_or_else(|| {
                EngineError::InvalidData(format!(
                    "not enough history for {} ({} closes)",
                    symbol,
                    closes.len()
                ))
            })
    }
}

/// Volatility index readings for one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilitySnapshot {
    pub spot: f64,
    /// Front-month future
    pub near_term: f64,
    /// Back-month future
    pub far_term: f64,
}

impl VolatilitySnapshot {
    /// Term structure is in backwardation unless strictly in contango
    pub fn is_backwardation(&self) -> bool {
        self.near_term >= self.far_term
    }
}

/// Live market state for the traded instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price: f64,
    pub volatility: VolatilitySnapshot,
    /// Intraday trade prices of the current session
    pub session_prices: Vec<f64>,
    /// Volumes matching `session_prices`
    pub session_volumes: Vec<f64>,
    /// Last prices of other instruments the engine may trade
    #[serde(default)]
    pub quotes: BTreeMap<Symbol, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Net liquidation value
    pub balance: f64,
    pub available: f64,
}

/// Broker response to an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderOutcome {
    Filled { price: f64, quantity: u32 },
    Rejected { reason: String },
}

/// Broker connectivity
#[async_trait]
pub trait MarketConnector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn snapshot(&self) -> EngineResult<MarketSnapshot>;

    async fn account(&self) -> EngineResult<AccountSnapshot>;

    async fn place_order(&self, signal: &TradeSignal) -> EngineResult<OrderOutcome>;
}
