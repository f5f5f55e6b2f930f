//! Paper trading connector
//!
//! Quotes come from the latest bar of a [`HistoricalStore`]; every order
//! fills at the signal price as long as cash (buys) or inventory (sells)
//! cover it.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    AccountSnapshot, HistoricalStore, MarketConnector, MarketSnapshot, OrderOutcome,
    VolatilitySnapshot,
};
use crate::config::TradingConfig;
use crate::error::{EngineError, EngineResult};
use crate::{Candle, Side, Symbol, TradeSignal};

/// Closes averaged as a far-term proxy when no back-month series is loaded
const FAR_TERM_PROXY_DAYS: usize = 63;

#[derive(Debug, Default)]
struct PaperBook {
    cash: f64,
    positions: BTreeMap<Symbol, u32>,
    marks: BTreeMap<Symbol, f64>,
}

impl PaperBook {
    fn equity(&self) -> f64 {
        self.cash
            + self
                .positions
                .iter()
                .map(|(symbol, qty)| *qty as f64 * self.marks.get(symbol).copied().unwrap_or(0.0))
                .sum::<f64>()
    }
}

pub struct PaperConnector {
    store: Arc<HistoricalStore>,
    symbol: Symbol,
    inverse_symbol: Symbol,
    volatility_symbol: Symbol,
    term_structure: Option<(Symbol, Symbol)>,
    book: Mutex<PaperBook>,
}

impl PaperConnector {
    /// Paper book over `store`. Near/far futures series configured in
    /// `trading` drive the term structure when both are set.
    pub fn new(store: Arc<HistoricalStore>, trading: &TradingConfig, starting_cash: f64) -> Self {
        let term_structure = trading
            .near_term_symbol
            .clone()
            .zip(trading.far_term_symbol.clone());

        Self {
            store,
            symbol: trading.symbol.clone(),
            inverse_symbol: trading.inverse_symbol.clone(),
            volatility_symbol: trading.volatility_symbol.clone(),
            term_structure,
            book: Mutex::new(PaperBook {
                cash: starting_cash,
                ..Default::default()
            }),
        }
    }

    /// Use stored front/back-month futures series for the term structure
    pub fn with_term_structure(mut self, near: Symbol, far: Symbol) -> Self {
        self.term_structure = Some((near, far));
        self
    }

    /// Current paper holdings
    pub async fn positions(&self) -> BTreeMap<Symbol, u32> {
        self.book.lock().await.positions.clone()
    }

    fn series(&self, symbol: &Symbol) -> EngineResult<&[Candle]> {
        self.store
            .series(symbol)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EngineError::Connector(format!("no quotes for {}", symbol)))
    }

    fn last_close(&self, symbol: &Symbol) -> EngineResult<f64> {
        let series = self.series(symbol)?;
        Ok(series[series.len() - 1].close)
    }

    fn volatility(&self) -> EngineResult<VolatilitySnapshot> {
        let spot = self.last_close(&self.volatility_symbol)?;

        let (near_term, far_term) = match &self.term_structure {
            Some((near, far)) => (self.last_close(near)?, self.last_close(far)?),
            None => {
                let closes = self.series(&self.volatility_symbol)?;
                let tail = &closes[closes.len().saturating_sub(FAR_TERM_PROXY_DAYS)..];
                let proxy = tail.iter().map(|c| c.close).sum::<f64>() / tail.len() as f64;
                (spot, proxy)
            }
        };

        Ok(VolatilitySnapshot {
            spot,
            near_term,
            far_term,
        })
    }
}

#[async_trait]
impl MarketConnector for PaperConnector {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn snapshot(&self) -> EngineResult<MarketSnapshot> {
        let series = self.series(&self.symbol)?;
        let bar = series[series.len() - 1].clone();

        // Synthetic session path through the last bar
        let session_prices = vec![bar.open, bar.low, bar.high, bar.close];
        let session_volumes = vec![bar.volume / 4.0; 4];

        let mut quotes = BTreeMap::new();
        if let Ok(price) = self.last_close(&self.inverse_symbol) {
            quotes.insert(self.inverse_symbol.clone(), price);
        }

        let mut book = self.book.lock().await;
        book.marks.insert(self.symbol.clone(), bar.close);
        book.marks.extend(quotes.iter().map(|(s, p)| (s.clone(), *p)));

        Ok(MarketSnapshot {
            price: bar.close,
            volatility: self.volatility()?,
            session_prices,
            session_volumes,
            quotes,
        })
    }

    async fn account(&self) -> EngineResult<AccountSnapshot> {
        let book = self.book.lock().await;
        Ok(AccountSnapshot {
            balance: book.equity(),
            available: book.cash,
        })
    }

    async fn place_order(&self, signal: &TradeSignal) -> EngineResult<OrderOutcome> {
        let mut book = self.book.lock().await;
        let notional = signal.price * signal.quantity as f64;
        let held = book.positions.get(&signal.symbol).copied().unwrap_or(0);

        match signal.action {
            Side::Buy if notional > book.cash => {
                return Ok(OrderOutcome::Rejected {
                    reason: format!("insufficient cash: need {:.2}, have {:.2}", notional, book.cash),
                });
            }
            Side::Sell if signal.quantity > held => {
                return Ok(OrderOutcome::Rejected {
                    reason: format!("insufficient position: selling {}, holding {}", signal.quantity, held),
                });
            }
            Side::Buy => {
                book.cash -= notional;
                book.positions.insert(signal.symbol.clone(), held + signal.quantity);
            }
            Side::Sell => {
                book.cash += notional;
                let remaining = held - signal.quantity;
                if remaining == 0 {
                    book.positions.remove(&signal.symbol);
                } else {
                    book.positions.insert(signal.symbol.clone(), remaining);
                }
            }
        }
        book.marks.insert(signal.symbol.clone(), signal.price);

        info!(
            "Paper fill: {} {} {} @ {:.2}",
            signal.action, signal.quantity, signal.symbol, signal.price
        );
        debug!(cash = book.cash, equity = book.equity(), "Paper book updated");

        Ok(OrderOutcome::Filled {
            price: signal.price,
            quantity: signal.quantity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn store() -> Arc<HistoricalStore> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let make = |closes: Vec<f64>| -> Vec<Candle> {
            closes
                .into_iter()
                .enumerate()
                .map(|(i, c)| Candle {
                    datetime: start + Duration::days(i as i64),
                    open: c,
                    high: c + 1.0,
                    low: c - 1.0,
                    close: c,
                    volume: 400.0,
                })
                .collect()
        };
        Arc::new(
            HistoricalStore::new()
                .with_series(Symbol::new("SPY"), make(vec![100.0, 101.0, 102.0]))
                .with_series(Symbol::new("^VIX"), make(vec![20.0, 18.0, 16.0])),
        )
    }

    #[tokio::test]
    async fn test_snapshot_quotes_latest_bar() {
        let paper = PaperConnector::new(store(), &TradingConfig::default(), 10_000.0);
        let snapshot = paper.snapshot().await.unwrap();
        assert_eq!(snapshot.price, 102.0);
        assert_eq!(snapshot.volatility.spot, 16.0);
        // Spot below its average: contango
        assert!(!snapshot.volatility.is_backwardation());
        assert_eq!(snapshot.session_prices.len(), snapshot.session_volumes.len());
    }

    #[tokio::test]
    async fn test_fills_track_cash_and_positions() {
        let paper = PaperConnector::new(store(), &TradingConfig::default(), 1_000.0);
        let buy = TradeSignal::buy(Symbol::new("SPY"), 2, 100.0, "test");
        assert!(matches!(paper.place_order(&buy).await.unwrap(), OrderOutcome::Filled { .. }));

        let account = paper.account().await.unwrap();
        assert!((account.available - 800.0).abs() < 1e-9);
        assert!((account.balance - 1_000.0).abs() < 1e-9);

        let oversell = TradeSignal::sell(Symbol::new("SPY"), 3, 100.0, "test");
        assert!(matches!(paper.place_order(&oversell).await.unwrap(), OrderOutcome::Rejected { .. }));

        let sell = TradeSignal::sell(Symbol::new("SPY"), 2, 105.0, "test");
        paper.place_order(&sell).await.unwrap();
        assert!(paper.positions().await.is_empty());
        assert!((paper.account().await.unwrap().balance - 1_010.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_buy_without_cash_rejected() {
        let paper = PaperConnector::new(store(), &TradingConfig::default(), 50.0);
        let buy = TradeSignal::buy(Symbol::new("SPY"), 1, 100.0, "test");
        assert!(matches!(paper.place_order(&buy).await.unwrap(), OrderOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_futures_series_drive_term_structure() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let flat = |close: f64| -> Vec<Candle> {
            (0..2)
                .map(|i| Candle {
                    datetime: start + Duration::days(i),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 100.0,
                })
                .collect()
        };
        let mut store = Arc::try_unwrap(store()).unwrap();
        store.insert(Symbol::new("VX1"), flat(24.0));
        store.insert(Symbol::new("VX2"), flat(21.0));
        let store = Arc::new(store);

        // Only one leg configured: spot/average proxy
        let partial = TradingConfig {
            near_term_symbol: Some(Symbol::new("VX1")),
            ..Default::default()
        };
        let paper = PaperConnector::new(store.clone(), &partial, 0.0);
        assert!(!paper.snapshot().await.unwrap().volatility.is_backwardation());

        let trading = TradingConfig {
            near_term_symbol: Some(Symbol::new("VX1")),
            far_term_symbol: Some(Symbol::new("VX2")),
            ..Default::default()
        };
        let vol = PaperConnector::new(store.clone(), &trading, 0.0)
            .snapshot()
            .await
            .unwrap()
            .volatility;
        assert_eq!((vol.near_term, vol.far_term), (24.0, 21.0));
        assert!(vol.is_backwardation());

        let explicit = PaperConnector::new(store, &TradingConfig::default(), 0.0)
            .with_term_structure(Symbol::new("VX2"), Symbol::new("VX1"));
        assert!(!explicit.snapshot().await.unwrap().volatility.is_backwardation());
    }
}
