//! Sideways regime: VWAP mean reversion
//!
//! Buys one unit when price trades at or below the lower VWAP band and
//! sells it back at VWAP. Any open unit is flattened from the exit time
//! onward; no new entries are taken after it.

use chrono::NaiveTime;
use tracing::{debug, info};

use super::{OvernightContext, RegimeStrategy, TickContext};
use crate::config::GreenConfig;
use crate::indicators::{self, VwapBands};
use crate::risk::RiskGate;
use crate::{KillStatus, OvernightAction, Symbol, TradeSignal};

/// At most one unit of exposure
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GreenState {
    pub position: u32,
    pub entry_price: f64,
}

#[derive(Debug, Clone)]
pub struct GreenStrategy {
    config: GreenConfig,
    symbol: Symbol,
    unit: u32,
    state: GreenState,
}

impl GreenStrategy {
    pub fn new(config: GreenConfig, symbol: Symbol, unit: u32) -> Self {
        Self {
            config,
            symbol,
            unit: unit.max(1),
            state: GreenState::default(),
        }
    }

    pub fn state(&self) -> GreenState {
        self.state
    }

    /// VWAP and deviation bands of the session so far
    pub fn compute_bands(&self, prices: &[f64], volumes: &[f64]) -> VwapBands {
        indicators::vwap_bands(prices, volumes, self.config.band_multiplier)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn on_tick(
        &mut self,
        gate: &RiskGate,
        price: f64,
        vwap: f64,
        lower_band: f64,
        kill: KillStatus,
        daily_loss: f64,
        account_balance: f64,
        now: NaiveTime,
    ) -> Option<TradeSignal> {
        if now >= self.config.exit_time {
            if self.state.position > 0 {
                info!(price, "Green: session-close liquidation");
                return Some(self.exit(price, "session-close liquidation"));
            }
            return None;
        }

        // No session prints yet: no bands to trade against
        if vwap <= 0.0 {
            debug!(price, "Green: empty session, bands unavailable");
            return None;
        }

        if !gate.approve_order(kill, daily_loss, account_balance) {
            return None;
        }

        if self.state.position == 0 && price <= lower_band {
            self.state = GreenState {
                position: self.unit,
                entry_price: price,
            };
            info!(price, lower_band, "Green: entry at lower band");
            return Some(TradeSignal::buy(
                self.symbol.clone(),
                self.unit,
                price,
                format!("price {:.2} at or below lower band {:.2}", price, lower_band),
            ));
        }

        if self.state.position > 0 && price >= vwap {
            info!(price, vwap, "Green: mean reversion target reached");
            return Some(self.exit(price, "reverted to VWAP"));
        }

        None
    }

    /// Carry the unit overnight only when it is profitable and still far
    /// from its VWAP target
    pub fn should_hold_overnight(&self, ctx: &OvernightContext) -> bool {
        if ctx.is_last_trading_day_of_week {
            debug!("Green: no weekend carry");
            return false;
        }

        if self.state.position > 0 && ctx.current_price < self.state.entry_price {
            debug!(price = ctx.current_price, entry = self.state.entry_price, "Green: at a loss");
            return false;
        }

        if ctx.vwap > 0.0 {
            let distance = (ctx.current_price - ctx.vwap).abs() / ctx.vwap;
            if distance < ctx.daily_range_pct * self.config.near_target_fraction {
                debug!(distance, range = ctx.daily_range_pct, "Green: close enough to VWAP");
                return false;
            }
        }

        true
    }

    fn exit(&mut self, price: f64, reason: &str) -> TradeSignal {
        let quantity = self.state.position;
        let pnl = (price - self.state.entry_price) * quantity as f64;
        self.state = GreenState::default();
        TradeSignal::sell(self.symbol.clone(), quantity, price, reason).with_pnl(pnl)
    }
}

impl RegimeStrategy for GreenStrategy {
    fn name(&self) -> &'static str {
        "green"
    }

    fn on_tick(&mut self, ctx: &TickContext<'_>) -> Vec<TradeSignal> {
        let bands = self.compute_bands(ctx.session_prices, ctx.session_volumes);
        GreenStrategy::on_tick(
            self,
            ctx.risk,
            ctx.price,
            bands.vwap,
            bands.lower,
            ctx.kill_status,
            ctx.daily_loss,
            ctx.account_balance,
            ctx.session_time,
        )
        .into_iter()
        .collect()
    }

    fn should_keep_overnight(&self, ctx: &OvernightContext) -> OvernightAction {
        if self.should_hold_overnight(ctx) {
            OvernightAction::KeepAll
        } else {
            OvernightAction::LiquidateAll
        }
    }

    fn close_out(&mut self, action: OvernightAction, price: f64) -> Vec<TradeSignal> {
        // A single unit cannot be halved
        match action {
            OvernightAction::KeepAll => vec![],
            _ if self.state.position == 0 => vec![],
            _ => vec![self.exit(price, "overnight liquidation")],
        }
    }

    fn exposure(&self) -> u32 {
        self.state.position
    }

    fn reset(&mut self) {
        self.state = GreenState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::at;
    use super::*;
    use crate::Side;

    fn strategy() -> GreenStrategy {
        GreenStrategy::new(GreenConfig::default(), Symbol::new("SPY"), 1)
    }

    #[test]
    fn test_entry_then_exit_with_pnl() {
        let gate = RiskGate::default();
        let mut green = strategy();

        let buy = green
            .on_tick(&gate, 98.0, 100.0, 98.5, KillStatus::Clear, 0.0, 10_000.0, at(10, 0))
            .unwrap();
        assert_eq!(buy.action, Side::Buy);
        assert_eq!(green.state().position, 1);

        assert!(green
            .on_tick(&gate, 99.0, 100.0, 98.5, KillStatus::Clear, 0.0, 10_000.0, at(10, 5))
            .is_none());

        let sell = green
            .on_tick(&gate, 100.5, 100.0, 98.5, KillStatus::Clear, 0.0, 10_000.0, at(10, 10))
            .unwrap();
        assert_eq!(sell.action, Side::Sell);
        assert!((sell.pnl.unwrap() - 2.5).abs() < 1e-9);
        assert_eq!(green.state(), GreenState::default());
    }

    #[test]
    fn test_empty_session_neither_enters_nor_exits() {
        use super::super::test_support::instant;
        use std::collections::BTreeMap;

        let gate = RiskGate::default();
        let mut green = strategy();
        green.on_tick(&gate, 98.0, 100.0, 98.5, KillStatus::Clear, 0.0, 10_000.0, at(10, 0));

        assert!(green
            .on_tick(&gate, 97.0, 0.0, 0.0, KillStatus::Clear, 0.0, 10_000.0, at(10, 5))
            .is_none());
        assert_eq!(green.state().position, 1);

        let exposure = BTreeMap::new();
        let prices = BTreeMap::new();
        let ctx = TickContext {
            now: instant(5, 15),
            session_time: at(10, 10),
            risk: &gate,
            kill_status: KillStatus::Clear,
            daily_loss: 0.0,
            account_balance: 10_000.0,
            price: 97.0,
            session_prices: &[],
            session_volumes: &[],
            daily: &[],
            backwardation: false,
            new_low: false,
            open_exposure: &exposure,
            prices: &prices,
        };
        assert!(RegimeStrategy::on_tick(&mut green, &ctx).is_empty());
        assert_eq!(green.state().position, 1);

        let mut flat = strategy();
        assert!(RegimeStrategy::on_tick(&mut flat, &ctx).is_empty());
        assert_eq!(flat.state().position, 0);
    }

    #[test]
    fn test_no_second_buy_while_holding() {
        let gate = RiskGate::default();
        let mut green = strategy();
        green.on_tick(&gate, 98.0, 100.0, 98.5, KillStatus::Clear, 0.0, 10_000.0, at(10, 0));
        let again = green.on_tick(&gate, 97.0, 100.0, 98.5, KillStatus::Clear, 0.0, 10_000.0, at(10, 1));
        assert!(again.is_none());
    }

    #[test]
    fn test_session_close_liquidation_bypasses_gate() {
        let gate = RiskGate::default();
        let mut green = strategy();
        green.on_tick(&gate, 98.0, 100.0, 98.5, KillStatus::Clear, 0.0, 10_000.0, at(10, 0));

        let sell = green
            .on_tick(&gate, 97.0, 100.0, 98.5, KillStatus::HaltAll, 0.0, 0.0, at(15, 50))
            .unwrap();
        assert_eq!(sell.action, Side::Sell);
        assert!((sell.pnl.unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_entry_after_exit_time_or_when_halted() {
        let gate = RiskGate::default();
        let mut green = strategy();
        assert!(green
            .on_tick(&gate, 90.0, 100.0, 98.5, KillStatus::Clear, 0.0, 10_000.0, at(15, 55))
            .is_none());
        assert!(green
            .on_tick(&gate, 90.0, 100.0, 98.5, KillStatus::HaltNew, 0.0, 10_000.0, at(11, 0))
            .is_none());
        assert!(green
            .on_tick(&gate, 90.0, 100.0, 98.5, KillStatus::Clear, 0.0, 0.0, at(11, 0))
            .is_none());
    }

    #[test]
    fn test_should_hold_overnight() {
        let gate = RiskGate::default();
        let mut green = strategy();
        green.on_tick(&gate, 98.0, 100.0, 98.5, KillStatus::Clear, 0.0, 10_000.0, at(10, 0));

        let far_from_vwap = OvernightContext {
            current_price: 99.0,
            vwap: 103.0,
            daily_range_pct: 0.02,
            ..Default::default()
        };
        assert!(green.should_hold_overnight(&far_from_vwap));

        let friday = OvernightContext {
            is_last_trading_day_of_week: true,
            ..far_from_vwap
        };
        assert!(!green.should_hold_overnight(&friday));

        let losing = OvernightContext {
            current_price: 97.0,
            ..far_from_vwap
        };
        assert!(!green.should_hold_overnight(&losing));

        let near_target = OvernightContext {
            current_price: 99.0,
            vwap: 99.5,
            ..far_from_vwap
        };
        assert!(!green.should_hold_overnight(&near_target));
    }

    #[test]
    fn test_close_out_and_reset() {
        let gate = RiskGate::default();
        let mut green = strategy();
        green.on_tick(&gate, 98.0, 100.0, 98.5, KillStatus::Clear, 0.0, 10_000.0, at(10, 0));
        assert!(green.close_out(OvernightAction::KeepAll, 99.0).is_empty());
        let signals = green.close_out(OvernightAction::LiquidateAll, 99.0);
        assert_eq!(signals.len(), 1);
        assert!(!green.has_position());
        green.reset();
        assert_eq!(green.state(), GreenState::default());
    }
}
