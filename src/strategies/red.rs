//! Trending regime: breakout entries with bounded pyramiding
//!
//! The first leg opens when price clears the previous session high.
//! Further legs are added each time price gains another `pyramid_step`
//! over the last leg, up to `max_legs`. A close below the moving average
//! flattens every leg, and that exit is checked before the risk gate so
//! it can never be blocked.

use tracing::{debug, info};

use super::{OvernightContext, RegimeStrategy, TickContext};
use crate::config::RedConfig;
use crate::indicators;
use crate::risk::RiskGate;
use crate::{KillStatus, OvernightAction, PositionLeg, Symbol, TradeSignal};

/// Legs in entry order, never more than the configured maximum
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RedState {
    pub legs: Vec<PositionLeg>,
    pub last_pyramid_price: f64,
}

impl RedState {
    pub fn total_quantity(&self) -> u32 {
        self.legs.iter().map(|l| l.quantity).sum()
    }

    /// Quantity-weighted entry price
    pub fn average_entry(&self) -> f64 {
        let quantity = self.total_quantity();
        if quantity == 0 {
            return 0.0;
        }
        self.legs
            .iter()
            .map(|l| l.entry_price * l.quantity as f64)
            .sum::<f64>()
            / quantity as f64
    }
}

#[derive(Debug, Clone)]
pub struct RedStrategy {
    config: RedConfig,
    symbol: Symbol,
    unit: u32,
    state: RedState,
}

impl RedStrategy {
    pub fn new(config: RedConfig, symbol: Symbol, unit: u32) -> Self {
        Self {
            config,
            symbol,
            unit: unit.max(1),
            state: RedState::default(),
        }
    }

    pub fn state(&self) -> &RedState {
        &self.state
    }

    pub fn config(&self) -> &RedConfig {
        &self.config
    }

    /// Trailing simple average, 0 with insufficient history
    pub fn moving_average(&self, closes: &[f64]) -> f64 {
        indicators::sma_last(closes, self.config.ma_period).unwrap_or(0.0)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn on_tick(
        &mut self,
        gate: &RiskGate,
        price: f64,
        prev_session_high: f64,
        closes: &[f64],
        kill: KillStatus,
        daily_loss: f64,
        account_balance: f64,
    ) -> Option<TradeSignal> {
        let ma = self.moving_average(closes);
        if self.state.total_quantity() > 0 && price < ma {
            info!(price, ma, legs = self.state.legs.len(), "Red: trend broken, liquidating");
            return self.liquidate(price, "price below moving average");
        }

        if !gate.approve_order(kill, daily_loss, account_balance) {
            return None;
        }

        let legs = self.state.legs.len();
        if legs == 0 && price > prev_session_high {
            info!(price, prev_session_high, "Red: breakout entry");
            return Some(self.add_leg(price, format!("breakout above {:.2}", prev_session_high)));
        }

        let next_level = self.state.last_pyramid_price * (1.0 + self.config.pyramid_step);
        if legs > 0 && legs < self.config.max_legs && price >= next_level {
            info!(price, leg = legs + 1, "Red: pyramiding");
            return Some(self.add_leg(price, format!("pyramid #{} at {:.2}", legs + 1, price)));
        }

        None
    }

    /// Close every leg at `price` with blended-entry P&L
    pub fn liquidate(&mut self, price: f64, reason: &str) -> Option<TradeSignal> {
        let quantity = self.state.total_quantity();
        if quantity == 0 {
            return None;
        }

        let pnl = (price - self.state.average_entry()) * quantity as f64;
        self.state = RedState::default();
        Some(TradeSignal::sell(self.symbol.clone(), quantity, price, reason).with_pnl(pnl))
    }

    /// Sell the newest half of the legs (rounded up)
    pub fn trim_half(&mut self, price: f64) -> Option<TradeSignal> {
        let legs = self.state.legs.len();
        if legs == 0 {
            return None;
        }

        let keep = legs / 2;
        let sold: Vec<PositionLeg> = self.state.legs.drain(keep..).collect();
        let quantity: u32 = sold.iter().map(|l| l.quantity).sum();
        let pnl: f64 = sold
            .iter()
            .map(|l| (price - l.entry_price) * l.quantity as f64)
            .sum();

        self.state.last_pyramid_price = self
            .state
            .legs
            .last()
            .map(|l| l.entry_price)
            .unwrap_or(0.0);

        Some(
            TradeSignal::sell(self.symbol.clone(), quantity, price, "overnight trim to half")
                .with_pnl(pnl),
        )
    }

    fn add_leg(&mut self, price: f64, reason: String) -> TradeSignal {
        self.state.legs.push(PositionLeg {
            entry_price: price,
            quantity: self.unit,
        });
        self.state.last_pyramid_price = price;
        TradeSignal::buy(self.symbol.clone(), self.unit, price, reason)
    }
}

impl RegimeStrategy for RedStrategy {
    fn name(&self) -> &'static str {
        "red"
    }

    fn on_tick(&mut self, ctx: &TickContext<'_>) -> Vec<TradeSignal> {
        let closes: Vec<f64> = ctx.daily.iter().map(|c| c.close).collect();
        let prev_high = ctx.daily.last().map(|c| c.high).unwrap_or(f64::INFINITY);

        RedStrategy::on_tick(
            self,
            ctx.risk,
            ctx.price,
            prev_high,
            &closes,
            ctx.kill_status,
            ctx.daily_loss,
            ctx.account_balance,
        )
        .into_iter()
        .collect()
    }

    fn should_keep_overnight(&self, ctx: &OvernightContext) -> OvernightAction {
        if ctx.live_volatility >= ctx.vol_mean + ctx.vol_std {
            debug!(live = ctx.live_volatility, "Red: volatility one sigma above mean");
            return OvernightAction::LiquidateAll;
        }

        if ctx.ma20 > 0.0 && ctx.current_price < ctx.ma20 {
            debug!(price = ctx.current_price, ma = ctx.ma20, "Red: below moving average");
            return OvernightAction::LiquidateAll;
        }

        if ctx.atr_pct > 0.0 && ctx.daily_return > ctx.atr_pct * self.config.overheat_atr_multiple {
            debug!(daily_return = ctx.daily_return, atr_pct = ctx.atr_pct, "Red: overheated");
            return OvernightAction::KeepHalf;
        }

        if ctx.is_last_trading_day_of_week {
            return OvernightAction::KeepHalf;
        }

        OvernightAction::KeepAll
    }

    fn close_out(&mut self, action: OvernightAction, price: f64) -> Vec<TradeSignal> {
        let signal = match action {
            OvernightAction::KeepAll => None,
            OvernightAction::KeepHalf => self.trim_half(price),
            OvernightAction::LiquidateAll => self.liquidate(price, "overnight liquidation"),
        };
        signal.into_iter().collect()
    }

    fn exposure(&self) -> u32 {
        self.state.total_quantity()
    }

    fn reset(&mut self) {
        self.state = RedState::default();
    }
}
