//! Risk gate
//!
//! Derives the kill-switch status from the volatility term structure and
//! approves or rejects individual order requests.
//!
//! Kill-switch law, first match wins:
//! ```text
//! invalid input (non-finite, near <= 0, far <= 0)      -> HALT_ALL
//! near / far >= halt_all_ratio  or  near >= halt_all_level -> HALT_ALL
//! near / far >  halt_long_ratio                         -> HALT_LONG
//! near >= halt_new_level                                -> HALT_NEW
//! otherwise                                             -> CLEAR
//! ```
//!
//! Order approval rejects on any non-clear status, on a non-positive or
//! non-finite balance, and when `daily_loss / balance` exceeds the daily
//! loss limit.

use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::KillStatus;

/// Pure kill-switch evaluation. O(1), no state.
pub fn kill_status(config: &RiskConfig, near_term: f64, far_term: f64) -> KillStatus {
    if !near_term.is_finite() || !far_term.is_finite() || near_term <= 0.0 || far_term <= 0.0 {
        return KillStatus::HaltAll;
    }

    let ratio = near_term / far_term;
    if ratio >= config.halt_all_ratio || near_term >= config.halt_all_level {
        KillStatus::HaltAll
    } else if ratio > config.halt_long_ratio {
        KillStatus::HaltLong
    } else if near_term >= config.halt_new_level {
        KillStatus::HaltNew
    } else {
        KillStatus::Clear
    }
}

/// Kill-switch evaluator and order approver.
///
/// The only state kept is the last emitted status, used to log changes.
#[derive(Debug, Clone)]
pub struct RiskGate {
    config: RiskConfig,
    last_status: Option<KillStatus>,
    changed: bool,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            last_status: None,
            changed: false,
        }
    }

    /// Evaluate the kill switch for this tick.
    ///
    /// The result is the same as [`kill_status`]; a warning is logged only
    /// when it differs from the previous evaluation.
    pub fn evaluate_kill_switch(&mut self, near_term: f64, far_term: f64) -> KillStatus {
        let status = kill_status(&self.config, near_term, far_term);

        self.changed = self.last_status != Some(status);
        if self.changed {
            match (self.last_status, status) {
                (None, KillStatus::Clear) => {
                    info!(near_term, far_term, "Kill switch initialised: CLEAR")
                }
                (_, KillStatus::Clear) => {
                    info!(near_term, far_term, "Kill switch cleared")
                }
                (previous, _) => warn!(
                    previous = ?previous,
                    status = %status,
                    near_term,
                    far_term,
                    "Kill switch status changed"
                ),
            }
        }
        self.last_status = Some(status);

        status
    }

    /// Whether the most recent evaluation changed the status
    pub fn status_changed(&self) -> bool {
        self.changed
    }

    pub fn last_status(&self) -> Option<KillStatus> {
        self.last_status
    }

    /// Approve a new entry.
    pub fn approve_order(&self, kill: KillStatus, daily_loss: f64, account_balance: f64) -> bool {
        if !kill.is_clear() {
            debug!(status = %kill, "Order rejected: kill switch active");
            return false;
        }

        if !account_balance.is_finite() || account_balance <= 0.0 || !daily_loss.is_finite() {
            debug!(account_balance, daily_loss, "Order rejected: invalid account state");
            return false;
        }

        let loss_ratio = daily_loss / account_balance;
        if loss_ratio > self.config.daily_loss_limit {
            debug!(
                loss_ratio,
                limit = self.config.daily_loss_limit,
                "Order rejected: daily loss limit reached"
            );
            return false;
        }

        true
    }
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}
