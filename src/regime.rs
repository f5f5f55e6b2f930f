//! Regime classification
//!
//! Maps a volatility Z-score, the Kaufman efficiency ratio and Wilder's
//! ADX to one of three regimes. Crisis overrides trending, trending
//! overrides sideways.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::config::RegimeConfig;
use crate::indicators;
use crate::{Candle, Regime};

/// Completed daily bars fed to the efficiency ratio and ADX
pub const REGIME_LOOKBACK_DAYS: usize = 30;

/// Daily bars of sessions that closed before `session_date`
pub fn completed_bars(bars: Vec<Candle>, session_date: NaiveDate) -> Vec<Candle> {
    bars.into_iter()
        .filter(|c| c.datetime.date_naive() < session_date)
        .collect()
}

/// A regime transition observed by [`RegimeClassifier::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegimeChange {
    pub from: Regime,
    pub to: Regime,
}

#[derive(Debug, Clone)]
pub struct RegimeClassifier {
    config: RegimeConfig,
    current: Regime,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            config,
            current: Regime::default(),
        }
    }

    pub fn current(&self) -> Regime {
        self.current
    }

    /// Efficiency ratio over the trailing window (`window` price changes)
    pub fn efficiency_ratio(&self, closes: &[f64]) -> f64 {
        let take = (self.config.efficiency_window + 1).min(closes.len());
        indicators::efficiency_ratio(&closes[closes.len() - take..])
    }

    /// Wilder ADX; 0 with fewer than `period + 1` bars or mismatched series
    pub fn directional_strength(&self, highs: &[f64], lows: &[f64], closes: &[f64]) -> f64 {
        let period = self.config.strength_period;
        if highs.len() != lows.len() || highs.len() != closes.len() || closes.len() < period + 1 {
            return 0.0;
        }
        indicators::adx_last(highs, lows, closes, period).unwrap_or(0.0)
    }

    /// Efficiency ratio and directional strength of the most recent
    /// [`REGIME_LOOKBACK_DAYS`] bars, oldest first
    pub fn assess(&self, daily: &[Candle]) -> (f64, f64) {
        let recent = &daily[daily.len().saturating_sub(REGIME_LOOKBACK_DAYS)..];
        let closes: Vec<f64> = recent.iter().map(|c| c.close).collect();
        let highs: Vec<f64> = recent.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = recent.iter().map(|c| c.low).collect();

        (
            self.efficiency_ratio(&closes),
            self.directional_strength(&highs, &lows, &closes),
        )
    }

    pub fn classify(
        &self,
        z_score: f64,
        efficiency: f64,
        directional_strength: f64,
        backwardation: bool,
    ) -> Regime {
        let regime = if z_score >= self.config.crisis_z_score || backwardation {
            Regime::Crisis
        } else if efficiency > self.config.efficiency_threshold
            && directional_strength > self.config.strength_threshold
        {
            Regime::Trending
        } else {
            Regime::Sideways
        };

        debug!(
            z_score,
            efficiency,
            directional_strength,
            backwardation,
            regime = %regime,
            "Regime classified"
        );
        regime
    }

    /// Record the regime for this tick, returning the transition if any
    pub fn update(&mut self, regime: Regime) -> Option<RegimeChange> {
        if regime == self.current {
            return None;
        }

        let change = RegimeChange {
            from: self.current,
            to: regime,
        };
        info!(from = %change.from, to = %change.to, "Regime changed");
        self.current = regime;
        Some(change)
    }
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        Self::new(RegimeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crisis_precedence() {
        let classifier = RegimeClassifier::default();
        assert_eq!(classifier.classify(2.0, 0.9, 60.0, false), Regime::Crisis);
        assert_eq!(classifier.classify(3.5, 0.0, 0.0, false), Regime::Crisis);
        assert_eq!(classifier.classify(-1.0, 0.9, 60.0, true), Regime::Crisis);
    }

    #[test]
    fn test_trending_requires_both_indicators() {
        let classifier = RegimeClassifier::default();
        assert_eq!(classifier.classify(1.0, 0.31, 25.1, false), Regime::Trending);
        assert_eq!(classifier.classify(1.0, 0.30, 40.0, false), Regime::Sideways);
        assert_eq!(classifier.classify(1.0, 0.50, 25.0, false), Regime::Sideways);
        assert_eq!(classifier.classify(1.99, 0.0, 0.0, false), Regime::Sideways);
    }

    #[test]
    fn test_update_fires_only_on_transition() {
        let mut classifier = RegimeClassifier::default();
        assert_eq!(classifier.update(Regime::Sideways), None);
        assert_eq!(
            classifier.update(Regime::Crisis),
            Some(RegimeChange {
                from: Regime::Sideways,
                to: Regime::Crisis
            })
        );
        assert_eq!(classifier.update(Regime::Crisis), None);
        assert_eq!(classifier.current(), Regime::Crisis);
    }

    #[test]
    fn test_efficiency_uses_trailing_window() {
        let classifier = RegimeClassifier::default();
        // Choppy start, clean trend over the last 21 closes
        let mut closes = vec![100.0, 90.0, 110.0, 80.0, 120.0];
        closes.extend((0..21).map(|x| 200.0 + x as f64));
        assert!((classifier.efficiency_ratio(&closes) - 1.0).abs() < 1e-9);
        assert_eq!(classifier.efficiency_ratio(&[100.0]), 0.0);
    }

    #[test]
    fn test_directional_strength_insufficient_data() {
        let classifier = RegimeClassifier::default();
        let highs: Vec<f64> = (0..14).map(|x| 101.0 + x as f64).collect();
        let lows: Vec<f64> = (0..14).map(|x| 99.0 + x as f64).collect();
        let closes: Vec<f64> = (0..14).map(|x| 100.0 + x as f64).collect();
        assert_eq!(classifier.directional_strength(&highs, &lows, &closes), 0.0);
        assert_eq!(classifier.directional_strength(&highs, &lows[..13], &closes), 0.0);
    }

    #[test]
    fn test_completed_bars_drop_current_session() {
        use chrono::{Duration, TimeZone, Utc};

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 21, 0, 0).unwrap();
        let bars: Vec<Candle> = (0..5)
            .map(|i| Candle {
                datetime: start + Duration::days(i),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1000.0,
            })
            .collect();

        let session = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let kept = completed_bars(bars, session);
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|c| c.datetime.date_naive() < session));
    }

    #[test]
    fn test_assess_uses_recent_window_only() {
        use chrono::{Duration, TimeZone, Utc};

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        // Long chop followed by a clean 30-day climb
        let closes: Vec<f64> = (0..60)
            .map(|i| if i < 30 { 100.0 + (i % 2) as f64 * 5.0 } else { 100.0 + (i - 29) as f64 })
            .collect();
        let bars: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                datetime: start + Duration::days(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1000.0,
            })
            .collect();

        let classifier = RegimeClassifier::default();
        let (efficiency, strength) = classifier.assess(&bars);
        assert!((efficiency - 1.0).abs() < 1e-9);
        assert!(strength > 25.0);
        assert_eq!(classifier.assess(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_directional_strength_trend() {
        let classifier = RegimeClassifier::default();
        let highs: Vec<f64> = (0..30).map(|x| 101.0 + 2.0 * x as f64).collect();
        let lows: Vec<f64> = (0..30).map(|x| 99.0 + 2.0 * x as f64).collect();
        let closes: Vec<f64> = (0..30).map(|x| 100.0 + 2.0 * x as f64).collect();
        assert!(classifier.directional_strength(&highs, &lows, &closes) > 25.0);
    }
}
