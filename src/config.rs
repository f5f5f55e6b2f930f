//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files. Every section
//! falls back to its defaults when omitted, and the traded symbols can be
//! overridden from the environment (`.env` is honoured by the binary).

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::Symbol;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub regime: RegimeConfig,
    pub volatility: VolatilityConfig,
    pub session: SessionConfig,
    pub green: GreenConfig,
    pub red: RedConfig,
    pub black: BlackConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override traded symbols from `TRADER_SYMBOL` / `TRADER_INVERSE_SYMBOL`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(symbol) = std::env::var("TRADER_SYMBOL") {
            self.trading.symbol = Symbol::new(symbol);
        }
        if let Ok(symbol) = std::env::var("TRADER_INVERSE_SYMBOL") {
            self.trading.inverse_symbol = Symbol::new(symbol);
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub symbol: Symbol,
    pub inverse_symbol: Symbol,
    pub volatility_symbol: Symbol,
    /// Front-month volatility future; with `far_term_symbol` replaces the
    /// spot/average proxy for the term structure
    pub near_term_symbol: Option<Symbol>,
    pub far_term_symbol: Option<Symbol>,
    /// Daily bars requested for indicators and the new-low check
    pub history_days: usize,
    pub unit_quantity: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol: Symbol::new("SPY"),
            inverse_symbol: Symbol::new("SQQQ"),
            volatility_symbol: Symbol::new("^VIX"),
            near_term_symbol: None,
            far_term_symbol: None,
            history_days: 252,
            unit_quantity: 1,
        }
    }
}

/// Kill-switch thresholds and the daily loss cap
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Maximum fraction of the account that may be lost in one day
    pub daily_loss_limit: f64,
    /// near/far ratio at or above which everything halts
    pub halt_all_ratio: f64,
    /// near/far ratio above which long entries halt
    pub halt_long_ratio: f64,
    pub halt_all_level: f64,
    pub halt_new_level: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit: 0.05,
            halt_all_ratio: 1.10,
            halt_long_ratio: 1.0,
            halt_all_level: 40.0,
            halt_new_level: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub crisis_z_score: f64,
    pub efficiency_threshold: f64,
    pub strength_threshold: f64,
    pub efficiency_window: usize,
    pub strength_period: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            crisis_z_score: 2.0,
            efficiency_threshold: 0.3,
            strength_threshold: 25.0,
            efficiency_window: 20,
            strength_period: 14,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    pub lookback_days: usize,
    pub min_observations: usize,
    pub change_threshold: f64,
    pub base_interval_ms: u64,
    pub fast_interval_ms: u64,
    pub fast_z_threshold: f64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            lookback_days: 126,
            min_observations: 20,
            change_threshold: 0.5,
            base_interval_ms: 5000,
            fast_interval_ms: 1000,
            fast_z_threshold: 1.0,
        }
    }
}

/// Exchange session clock
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// IANA zone name of the exchange, e.g. "America/New_York"
    pub timezone: Tz,
    pub pre_close: NaiveTime,
    pub market_close: NaiveTime,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            pre_close: hm(15, 50),
            market_close: hm(16, 0),
        }
    }
}

impl SessionConfig {
    /// Wall clock of the exchange at `now`, daylight saving included
    pub fn local_time(&self, now: DateTime<Utc>) -> DateTime<Tz> {
        now.with_timezone(&self.timezone)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenConfig {
    pub band_multiplier: f64,
    pub exit_time: NaiveTime,
    /// Fraction of the day's range treated as "close enough" to VWAP
    pub near_target_fraction: f64,
}

impl Default for GreenConfig {
    fn default() -> Self {
        Self {
            band_multiplier: 2.0,
            exit_time: hm(15, 50),
            near_target_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedConfig {
    pub max_legs: usize,
    pub pyramid_step: f64,
    pub ma_period: usize,
    pub atr_period: usize,
    pub overheat_atr_multiple: f64,
}

impl Default for RedConfig {
    fn default() -> Self {
        Self {
            max_legs: 3,
            pyramid_step: 0.01,
            ma_period: 20,
            atr_period: 20,
            overheat_atr_multiple: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlackConfig {
    pub inverse_entry_time: NaiveTime,
    pub max_holding_days: i64,
    pub max_daily_loss: f64,
}

impl Default for BlackConfig {
    fn default() -> Self {
        Self {
            inverse_entry_time: hm(14, 0),
            max_holding_days: 3,
            max_daily_loss: 0.05,
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}
