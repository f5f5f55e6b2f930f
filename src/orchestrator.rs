//! Adaptive scheduling loop
//!
//! Each tick runs in a fixed order:
//! 1. Collect market, account and history data (all collaborator I/O)
//! 2. Evaluate the kill switch; anything but CLEAR forces crisis handling
//! 3. Otherwise compute the hybrid Z-score, retime the loop, classify the regime
//! 4. Hand the tick to the regime's strategy
//! 5. Forward the resulting signals to the connector
//! 6. Run the pre-close and market-close session hooks once per date
//!
//! A collaborator failure in step 1 or 3 aborts the tick before any
//! strategy state changes. The loop itself never stops on a failed tick.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::EngineResult;
use crate::events::{EngineEvent, EventSender};
use crate::indicators;
use crate::market::{AccountSnapshot, MarketConnector, MarketDataStore, MarketSnapshot, OrderOutcome};
use crate::regime::{completed_bars, RegimeClassifier};
use crate::risk::RiskGate;
use crate::strategies::{
    BlackStrategy, GreenStrategy, OvernightContext, RedStrategy, RegimeStrategy, TickContext,
};
use crate::volatility::VolatilityCache;
use crate::{Candle, KillStatus, OvernightAction, Regime, Side, Symbol, TradeSignal};

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleState {
    pub current_interval_ms: u64,
    pub last_z_score: f64,
}

/// Outcome of one completed tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub kill_status: KillStatus,
    pub regime: Regime,
    /// Absent when the kill switch short-circuited the tick
    pub z_score: Option<f64>,
    pub interval_ms: u64,
    /// Every signal forwarded to the connector this tick, in order
    pub signals: Vec<TradeSignal>,
}

/// The three regime strategies, selected by regime
pub struct Strategies {
    pub green: GreenStrategy,
    pub red: RedStrategy,
    pub black: BlackStrategy,
}

impl Strategies {
    pub fn for_regime(&mut self, regime: Regime) -> &mut dyn RegimeStrategy {
        match regime {
            Regime::Sideways => &mut self.green,
            Regime::Trending => &mut self.red,
            Regime::Crisis => &mut self.black,
        }
    }

    /// Long exposure held by the sideways and trend strategies
    fn long_exposure(&self, symbol: &Symbol) -> BTreeMap<Symbol, u32> {
        let quantity = self.green.exposure() + self.red.exposure();
        let mut exposure = BTreeMap::new();
        if quantity > 0 {
            exposure.insert(symbol.clone(), quantity);
        }
        exposure
    }

    /// Clear the intraday strategies. The inverse hedge is left to its
    /// own holding limit.
    fn reset_intraday(&mut self) {
        self.green.reset();
        self.red.reset();
    }
}

/// Data gathered before any decision is made
struct TickInputs {
    snapshot: MarketSnapshot,
    account: AccountSnapshot,
    /// Completed sessions only, oldest first
    daily: Vec<Candle>,
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct Orchestrator {
    config: Config,
    store: Arc<dyn MarketDataStore>,
    connector: Arc<dyn MarketConnector>,
    events: Option<EventSender>,
    risk: RiskGate,
    classifier: RegimeClassifier,
    volatility: VolatilityCache,
    strategies: Strategies,
    schedule: ScheduleState,
    daily_loss: f64,
    session_date: Option<NaiveDate>,
    pre_close_done: Option<NaiveDate>,
    market_close_done: Option<NaiveDate>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        store: Arc<dyn MarketDataStore>,
        connector: Arc<dyn MarketConnector>,
    ) -> Self {
        let trading = &config.trading;
        let unit = trading.unit_quantity;

        Self {
            risk: RiskGate::new(config.risk.clone()),
            classifier: RegimeClassifier::new(config.regime.clone()),
            volatility: VolatilityCache::new(
                store.clone(),
                trading.volatility_symbol.clone(),
                config.volatility.clone(),
            ),
            strategies: Strategies {
                green: GreenStrategy::new(config.green.clone(), trading.symbol.clone(), unit),
                red: RedStrategy::new(config.red.clone(), trading.symbol.clone(), unit),
                black: BlackStrategy::new(config.black.clone(), trading.inverse_symbol.clone(), unit),
            },
            schedule: ScheduleState {
                current_interval_ms: config.volatility.base_interval_ms,
                last_z_score: 0.0,
            },
            daily_loss: 0.0,
            session_date: None,
            pre_close_done: None,
            market_close_done: None,
            store,
            connector,
            events: None,
            config,
        }
    }

    /// Publish engine events to a display sink
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn schedule(&self) -> ScheduleState {
        self.schedule
    }

    pub fn regime(&self) -> Regime {
        self.classifier.current()
    }

    pub fn daily_loss(&self) -> f64 {
        self.daily_loss
    }

    pub fn strategies(&self) -> &Strategies {
        &self.strategies
    }

    pub fn volatility(&self) -> &VolatilityCache {
        &self.volatility
    }

    /// Run the loop until `shutdown` fires.
    ///
    /// The next deadline is derived from the interval chosen by the tick
    /// that just finished. A significant move on `volatility_feed` runs a
    /// tick immediately and restarts the countdown from it.
    pub async fn run(
        mut self,
        mut shutdown: mpsc::Receiver<()>,
        mut volatility_feed: Option<mpsc::Receiver<f64>>,
    ) {
        info!(
            connector = self.connector.name(),
            symbol = %self.config.trading.symbol,
            interval_ms = self.schedule.current_interval_ms,
            "Orchestrator started"
        );

        let mut deadline = Instant::now();
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    self.tick_logged().await;
                    deadline = self.next_deadline();
                }
                reading = next_reading(&mut volatility_feed) => {
                    match reading {
                        Some(level) => {
                            if self.volatility.significant_change_default(level) {
                                info!(level, "Volatility moved sharply, refreshing now");
                                self.tick_logged().await;
                                deadline = self.next_deadline();
                            }
                        }
                        None => {
                            debug!("Volatility feed closed");
                            volatility_feed = None;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutdown requested, stopping at tick boundary");
                    break;
                }
            }
        }
    }

    fn next_deadline(&self) -> Instant {
        Instant::now() + Duration::from_millis(self.schedule.current_interval_ms)
    }

    async fn tick_logged(&mut self) {
        match self.tick().await {
            Ok(report) => debug!(
                kill = %report.kill_status,
                regime = %report.regime,
                z_score = ?report.z_score,
                signals = report.signals.len(),
                "Tick complete"
            ),
            Err(e) => {
                error!("Trading cycle error: {}", e);
                self.emit(EngineEvent::TickFailed(e.to_string()));
            }
        }
    }

    pub async fn tick(&mut self) -> EngineResult<TickReport> {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick as of `now`
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> EngineResult<TickReport> {
        let local = self.config.session.local_time(now);
        let session_date = local.date_naive();
        let session_time = local.time();
        self.roll_session(session_date);

        let inputs = self.collect_inputs(session_date).await?;
        let price = inputs.snapshot.price;
        let vol = inputs.snapshot.volatility;

        // Safety first: nothing below runs on stale kill-switch state
        let kill_status = self.risk.evaluate_kill_switch(vol.near_term, vol.far_term);
        self.emit(EngineEvent::KillSwitch {
            status: kill_status,
            changed: self.risk.status_changed(),
        });

        let backwardation = vol.is_backwardation();
        let (regime, z_score) = if kill_status.is_clear() {
            let z = self.assess_volatility(session_date, vol.spot).await?;
            (self.classify(&inputs.daily, z, backwardation), Some(z))
        } else {
            debug!(status = %kill_status, "Kill switch active, crisis handling");
            (Regime::Crisis, None)
        };

        let pre_close_due = session_time >= self.config.session.pre_close
            && self.pre_close_done != Some(session_date);
        let overnight = if pre_close_due {
            Some(self.overnight_context(&inputs, session_date).await?)
        } else {
            None
        };

        // No fallible I/O past this point until orders go out
        if let Some(change) = self.classifier.update(regime) {
            self.emit(EngineEvent::RegimeChanged {
                from: change.from,
                to: change.to,
            });
        }

        let market_open = session_time < self.config.session.market_close;
        let mut signals = if market_open {
            self.dispatch(&inputs, regime, kill_status, now, session_time, backwardation)
        } else {
            Vec::new()
        };

        if let Some(ctx) = overnight {
            self.pre_close_done = Some(session_date);
            signals.extend(self.handle_pre_close(regime, &ctx, &inputs.snapshot));
        }

        self.forward(&signals).await;

        if !market_open && self.market_close_done != Some(session_date) {
            self.handle_market_close(session_date);
        }

        Ok(TickReport {
            kill_status,
            regime,
            z_score,
            interval_ms: self.schedule.current_interval_ms,
            signals,
        })
    }

    // -------------------------------------------------------------------------
    // Tick stages
    // -------------------------------------------------------------------------

    fn roll_session(&mut self, session_date: NaiveDate) {
        if self.session_date != Some(session_date) {
            if self.session_date.is_some() {
                info!("New session {}, daily loss reset", session_date);
            }
            self.session_date = Some(session_date);
            self.daily_loss = 0.0;
        }
    }

    async fn collect_inputs(&self, session_date: NaiveDate) -> EngineResult<TickInputs> {
        let snapshot = self.connector.snapshot().await?;
        let account = self.connector.account().await?;
        let daily = self
            .store
            .daily_bars(&self.config.trading.symbol, self.config.trading.history_days)
            .await?;
        let daily = completed_bars(daily, session_date);

        Ok(TickInputs {
            snapshot,
            account,
            daily,
        })
    }

    /// Hybrid Z-score and loop retiming
    async fn assess_volatility(&mut self, session_date: NaiveDate, spot: f64) -> EngineResult<f64> {
        self.volatility.refresh_baseline_if_stale(session_date).await?;
        let z_score = self.volatility.hybrid_z_score(spot).await?;

        let interval_ms = self.volatility.recommended_interval_ms(z_score);
        if interval_ms != self.schedule.current_interval_ms {
            info!(
                "⏱ Interval changed: {} ms -> {} ms (z={:.2})",
                self.schedule.current_interval_ms, interval_ms, z_score
            );
            self.emit(EngineEvent::IntervalChanged {
                interval_ms,
                z_score,
            });
        }
        self.schedule = ScheduleState {
            current_interval_ms: interval_ms,
            last_z_score: z_score,
        };

        Ok(z_score)
    }

    fn classify(&self, daily: &[Candle], z_score: f64, backwardation: bool) -> Regime {
        let (efficiency, strength) = self.classifier.assess(daily);
        self.classifier.classify(z_score, efficiency, strength, backwardation)
    }

    fn dispatch(
        &mut self,
        inputs: &TickInputs,
        regime: Regime,
        kill_status: KillStatus,
        now: DateTime<Utc>,
        session_time: NaiveTime,
        backwardation: bool,
    ) -> Vec<TradeSignal> {
        let symbol = &self.config.trading.symbol;
        let snapshot = &inputs.snapshot;

        let mut prices = snapshot.quotes.clone();
        prices.insert(symbol.clone(), snapshot.price);
        let open_exposure = self.strategies.long_exposure(symbol);
        let new_low = inputs
            .daily
            .iter()
            .map(|c| c.low)
            .reduce(f64::min)
            .is_some_and(|low| snapshot.price < low);

        let ctx = TickContext {
            now,
            session_time,
            risk: &self.risk,
            kill_status,
            daily_loss: self.daily_loss,
            account_balance: inputs.account.balance,
            price: snapshot.price,
            session_prices: &snapshot.session_prices,
            session_volumes: &snapshot.session_volumes,
            daily: &inputs.daily,
            backwardation,
            new_low,
            open_exposure: &open_exposure,
            prices: &prices,
        };

        let strategy = self.strategies.for_regime(regime);
        let mut signals = strategy.on_tick(&ctx);
        debug!(strategy = strategy.name(), signals = signals.len(), "Strategy ticked");

        if regime == Regime::Crisis && !open_exposure.is_empty() {
            // Crisis liquidation flattened their positions
            self.strategies.green.reset();
            self.strategies.red.reset();
        }

        // The inverse hedge outlives the crisis that opened it
        if regime != Regime::Crisis && self.strategies.black.should_exit_inverse(now) {
            let inverse = self.strategies.black.inverse_symbol().clone();
            match prices.get(&inverse) {
                Some(&price) => signals.extend(self.strategies.black.exit_inverse(price)),
                None => warn!("No quote for {}, inverse exit deferred", inverse),
            }
        }

        signals
    }

    async fn overnight_context(
        &self,
        inputs: &TickInputs,
        session_date: NaiveDate,
    ) -> EngineResult<OvernightContext> {
        let snapshot = &inputs.snapshot;
        let price = snapshot.price;
        let closes: Vec<f64> = inputs.daily.iter().map(|c| c.close).collect();
        let highs: Vec<f64> = inputs.daily.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = inputs.daily.iter().map(|c| c.low).collect();

        let (vol_mean, vol_std) = match self.volatility.baseline() {
            Some(baseline) => (baseline.mean, baseline.std_dev),
            None => {
                let stats = self
                    .store
                    .volatility_stats(
                        &self.config.trading.volatility_symbol,
                        self.config.volatility.lookback_days,
                    )
                    .await?;
                (stats.mean, stats.std)
            }
        };

        let daily_return = match closes.last() {
            Some(&prev) if prev > 0.0 => price / prev - 1.0,
            _ => 0.0,
        };
        let atr_pct = indicators::atr_last(&highs, &lows, &closes, self.strategies.red.config().atr_period)
            .filter(|_| price > 0.0)
            .map(|atr| atr / price)
            .unwrap_or(0.0);

        Ok(OvernightContext {
            current_price: price,
            vwap: self
                .strategies
                .green
                .compute_bands(&snapshot.session_prices, &snapshot.session_volumes)
                .vwap,
            daily_range_pct: indicators::session_range_pct(&snapshot.session_prices),
            ma20: self.strategies.red.moving_average(&closes),
            live_volatility: snapshot.volatility.spot,
            vol_mean,
            vol_std,
            daily_return,
            atr_pct,
            is_last_trading_day_of_week: session_date.weekday() == Weekday::Fri,
        })
    }

    /// Overnight decisions for every strategy still holding a position
    fn handle_pre_close(
        &mut self,
        regime: Regime,
        ctx: &OvernightContext,
        snapshot: &MarketSnapshot,
    ) -> Vec<TradeSignal> {
        info!(regime = %regime, "⏰ Pre-close: overnight decisions");
        let symbol = &self.config.trading.symbol;

        if regime == Regime::Crisis {
            let exposure = self.strategies.long_exposure(symbol);
            let mut prices = snapshot.quotes.clone();
            prices.insert(symbol.clone(), snapshot.price);
            let signals = self.strategies.black.liquidate_all(&exposure, &prices);
            self.strategies.green.reset();
            self.strategies.red.reset();
            return signals;
        }

        let mut signals = Vec::new();
        for strategy in [
            &mut self.strategies.green as &mut dyn RegimeStrategy,
            &mut self.strategies.red,
        ] {
            if !strategy.has_position() {
                continue;
            }
            let action = strategy.should_keep_overnight(ctx);
            info!(strategy = strategy.name(), action = ?action, "Overnight decision");
            if action != OvernightAction::KeepAll {
                signals.extend(strategy.close_out(action, ctx.current_price));
            }
        }
        signals
    }

    fn handle_market_close(&mut self, session_date: NaiveDate) {
        info!("🔔 Market close {}: intraday strategies reset", session_date);
        self.strategies.reset_intraday();
        if let Some(holding) = self.strategies.black.state().inverse {
            info!(
                entry_time = %holding.entry_time,
                quantity = holding.quantity,
                "Inverse hedge carried overnight"
            );
        }
        self.market_close_done = Some(session_date);
    }

    /// Send signals to the connector; failures are reported, never retried
    async fn forward(&mut self, signals: &[TradeSignal]) {
        for signal in signals {
            self.emit(EngineEvent::Signal(signal.clone()));

            match self.connector.place_order(signal).await {
                Ok(OrderOutcome::Filled { price, .. }) => {
                    if let Some(pnl) = signal.pnl.filter(|p| *p < 0.0 && signal.action == Side::Sell) {
                        self.daily_loss += pnl.abs();
                        debug!(daily_loss = self.daily_loss, "Daily loss updated");
                    }
                    self.emit(EngineEvent::OrderFilled {
                        signal: signal.clone(),
                        price,
                    });
                }
                Ok(OrderOutcome::Rejected { reason }) => {
                    warn!("Order rejected for {}: {}", signal.symbol, reason);
                    self.emit(EngineEvent::OrderRejected {
                        signal: signal.clone(),
                        reason,
                    });
                }
                Err(e) => {
                    error!("Order placement failed for {}: {}", signal.symbol, e);
                    self.emit(EngineEvent::OrderRejected {
                        signal: signal.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

async fn next_reading(feed: &mut Option<mpsc::Receiver<f64>>) -> Option<f64> {
    match feed {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
