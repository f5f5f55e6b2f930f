//! Engine events for display sinks
//!
//! The orchestrator never waits on a consumer: events go out over an
//! unbounded channel and are dropped silently once the receiver is gone.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{KillStatus, Regime, TradeSignal};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    RegimeChanged { from: Regime, to: Regime },
    /// Sent on every evaluation; `changed` marks a transition
    KillSwitch { status: KillStatus, changed: bool },
    Signal(TradeSignal),
    OrderFilled { signal: TradeSignal, price: f64 },
    OrderRejected { signal: TradeSignal, reason: String },
    IntervalChanged { interval_ms: u64, z_score: f64 },
    TickFailed(String),
}

pub type EventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Display sink that writes events to the log
pub fn spawn_log_sink(mut events: EventReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::RegimeChanged { from, to } => {
                    info!("📊 Regime: {} -> {}", from, to)
                }
                EngineEvent::KillSwitch { status, changed: true } if !status.is_clear() => {
                    warn!("🚨 Kill switch: {}", status)
                }
                EngineEvent::KillSwitch { status, changed: true } => {
                    info!("Kill switch: {}", status)
                }
                EngineEvent::KillSwitch { .. } => {}
                EngineEvent::Signal(signal) => info!(
                    "📤 Signal: {} {} {} @ {:.2} ({})",
                    signal.action, signal.quantity, signal.symbol, signal.price, signal.reason
                ),
                EngineEvent::OrderFilled { signal, price } => info!(
                    "💰 Filled: {} {} {} @ {:.2}",
                    signal.action, signal.quantity, signal.symbol, price
                ),
                EngineEvent::OrderRejected { signal, reason } => warn!(
                    "❌ Order rejected ({} {}): {}",
                    signal.action, signal.symbol, reason
                ),
                EngineEvent::IntervalChanged { interval_ms, z_score } => {
                    info!("⏱ Interval: {} ms (z={:.2})", interval_ms, z_score)
                }
                EngineEvent::TickFailed(reason) => error!("Tick failed: {}", reason),
            }
        }
    })
}
