//! Crisis regime: liquidation and inverse hedge
//!
//! Long exposure held by the other strategies is sold unconditionally.
//! Late in a session that prints a new low under a backwardated volatility
//! curve, one unit of an inverse ETF may be bought; it is held for at most
//! `max_holding_days` calendar days. The inverse entry is allowed while the
//! kill switch is active, limited only by the daily loss cap.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::{OvernightContext, RegimeStrategy, TickContext};
use crate::config::BlackConfig;
use crate::{OvernightAction, Symbol, TradeSignal};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseHolding {
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub quantity: u32,
}

/// An inverse position always carries its entry timestamp
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlackState {
    pub inverse: Option<InverseHolding>,
}

impl BlackState {
    pub fn has_inverse_position(&self) -> bool {
        self.inverse.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct BlackStrategy {
    config: BlackConfig,
    inverse_symbol: Symbol,
    unit: u32,
    state: BlackState,
}

impl BlackStrategy {
    pub fn new(config: BlackConfig, inverse_symbol: Symbol, unit: u32) -> Self {
        Self {
            config,
            inverse_symbol,
            unit: unit.max(1),
            state: BlackState::default(),
        }
    }

    pub fn state(&self) -> BlackState {
        self.state
    }

    pub fn inverse_symbol(&self) -> &Symbol {
        &self.inverse_symbol
    }

    /// One SELL per symbol with a positive quantity, risk gate ignored
    pub fn liquidate_all(
        &self,
        positions: &BTreeMap<Symbol, u32>,
        prices: &BTreeMap<Symbol, f64>,
    ) -> Vec<TradeSignal> {
        positions
            .iter()
            .filter(|(_, qty)| **qty > 0)
            .map(|(symbol, qty)| {
                let price = prices.get(symbol).copied().unwrap_or(0.0);
                warn!("Black: crisis liquidation of {} {}", qty, symbol);
                TradeSignal::sell(symbol.clone(), *qty, price, "crisis liquidation")
            })
            .collect()
    }

    pub fn should_enter_inverse(&self, backwardation: bool, new_low: bool, now: NaiveTime) -> bool {
        !self.state.has_inverse_position()
            && backwardation
            && now >= self.config.inverse_entry_time
            && new_low
    }

    /// Open the inverse position unless today's loss already exceeds the cap
    pub fn enter_inverse(
        &mut self,
        price: f64,
        daily_loss: f64,
        account_balance: f64,
        now: DateTime<Utc>,
    ) -> Option<TradeSignal> {
        if self.state.has_inverse_position() {
            return None;
        }

        if !account_balance.is_finite() || account_balance <= 0.0 {
            warn!(account_balance, "Black: inverse entry rejected, no account balance");
            return None;
        }

        let loss_ratio = daily_loss / account_balance;
        if loss_ratio > self.config.max_daily_loss {
            warn!(loss_ratio, "Black: inverse entry rejected, daily loss cap");
            return None;
        }

        self.state.inverse = Some(InverseHolding {
            entry_time: now,
            entry_price: price,
            quantity: self.unit,
        });
        info!(price, symbol = %self.inverse_symbol, "Black: inverse hedge opened");
        Some(TradeSignal::buy(
            self.inverse_symbol.clone(),
            self.unit,
            price,
            "crisis inverse hedge",
        ))
    }

    pub fn should_exit_inverse(&self, now: DateTime<Utc>) -> bool {
        match self.state.inverse {
            Some(holding) => now - holding.entry_time >= Duration::days(self.config.max_holding_days),
            None => false,
        }
    }

    /// Close the inverse position; `None` when nothing is held
    pub fn exit_inverse(&mut self, price: f64) -> Option<TradeSignal> {
        let holding = self.state.inverse.take()?;
        let pnl = (price - holding.entry_price) * holding.quantity as f64;
        info!(price, pnl, "Black: inverse hedge closed");
        Some(
            TradeSignal::sell(self.inverse_symbol.clone(), holding.quantity, price, "inverse holding period over")
                .with_pnl(pnl),
        )
    }
}

impl RegimeStrategy for BlackStrategy {
    fn name(&self) -> &'static str {
        "black"
    }

    fn on_tick(&mut self, ctx: &TickContext<'_>) -> Vec<TradeSignal> {
        let mut signals = self.liquidate_all(ctx.open_exposure, ctx.prices);

        let inverse_price = ctx.prices.get(&self.inverse_symbol).copied();
        if self.should_exit_inverse(ctx.now) {
            match inverse_price {
                Some(price) => signals.extend(self.exit_inverse(price)),
                None => warn!("Black: no quote for {}, inverse exit deferred", self.inverse_symbol),
            }
        } else if self.should_enter_inverse(ctx.backwardation, ctx.new_low, ctx.session_time) {
            match inverse_price {
                Some(price) => signals.extend(self.enter_inverse(
                    price,
                    ctx.daily_loss,
                    ctx.account_balance,
                    ctx.now,
                )),
                None => warn!("Black: no quote for {}, inverse entry skipped", self.inverse_symbol),
            }
        }

        signals
    }

    /// The hedge is meant to span sessions; its own holding limit closes it
    fn should_keep_overnight(&self, _ctx: &OvernightContext) -> OvernightAction {
        OvernightAction::KeepAll
    }

    fn close_out(&mut self, action: OvernightAction, price: f64) -> Vec<TradeSignal> {
        match action {
            OvernightAction::KeepAll => vec![],
            _ => self.exit_inverse(price).into_iter().collect(),
        }
    }

    fn exposure(&self) -> u32 {
        self.state.inverse.map(|h| h.quantity).unwrap_or(0)
    }

    fn reset(&mut self) {
        self.state = BlackState::default();
    }
}
