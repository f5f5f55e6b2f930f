//! Regime strategies
//!
//! One state machine per regime, all behind [`RegimeStrategy`]:
//! - [`GreenStrategy`]: VWAP mean reversion for sideways markets
//! - [`RedStrategy`]: breakout with bounded pyramiding for trends
//! - [`BlackStrategy`]: crisis liquidation and short-dated inverse hedge
//!
//! The orchestrator selects exactly one strategy per tick and hands it a
//! [`TickContext`] assembled after all I/O for the tick has completed, so
//! a strategy transition never interleaves with a collaborator call.

pub mod black;
pub mod green;
pub mod red;

pub use black::{BlackState, BlackStrategy, InverseHolding};
pub use green::{GreenState, GreenStrategy};
pub use red::{RedState, RedStrategy};

use chrono::{DateTime, NaiveTime, Utc};
use std::collections::BTreeMap;

use crate::risk::RiskGate;
use crate::{Candle, KillStatus, OvernightAction, Symbol, TradeSignal};

// =============================================================================
// Contexts
// =============================================================================

/// Everything a strategy may look at during one tick
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub now: DateTime<Utc>,
    /// Wall clock in the exchange time zone
    pub session_time: NaiveTime,
    pub risk: &'a RiskGate,
    pub kill_status: KillStatus,
    pub daily_loss: f64,
    pub account_balance: f64,
    /// Last price of the traded instrument
    pub price: f64,
    pub session_prices: &'a [f64],
    pub session_volumes: &'a [f64],
    /// Completed daily bars, oldest first
    pub daily: &'a [Candle],
    pub backwardation: bool,
    pub new_low: bool,
    /// Quantity currently held by the sideways and trend strategies
    pub open_exposure: &'a BTreeMap<Symbol, u32>,
    /// Last known price per symbol
    pub prices: &'a BTreeMap<Symbol, f64>,
}

/// Inputs to the end-of-session hold decision
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OvernightContext {
    pub current_price: f64,
    pub vwap: f64,
    /// (session high - session low) / session low
    pub daily_range_pct: f64,
    pub ma20: f64,
    pub live_volatility: f64,
    pub vol_mean: f64,
    pub vol_std: f64,
    /// price / previous close - 1
    pub daily_return: f64,
    /// ATR as a fraction of price
    pub atr_pct: f64,
    pub is_last_trading_day_of_week: bool,
}

// =============================================================================
// Strategy Trait
// =============================================================================

pub trait RegimeStrategy: Send {
    fn name(&self) -> &'static str;

    /// Run one tick; signals are returned in the order they must be sent
    fn on_tick(&mut self, ctx: &TickContext<'_>) -> Vec<TradeSignal>;

    /// Decide what to carry past the close
    fn should_keep_overnight(&self, ctx: &OvernightContext) -> OvernightAction;

    /// Apply an overnight decision to the open position
    fn close_out(&mut self, action: OvernightAction, price: f64) -> Vec<TradeSignal>;

    /// Total quantity currently held
    fn exposure(&self) -> u32;

    fn has_position(&self) -> bool {
        self.exposure() > 0
    }

    /// Return to the zero state
    fn reset(&mut self);
}
